//! Transform options.

use serde::{Deserialize, Serialize};

/// Knobs for a single transform call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Skip the provenance block normally added to infrastructure documents.
    pub omit_metadata: bool,
    /// Maximum nesting of includes, expansions and template instantiations.
    pub max_depth: usize,
}

impl TransformOptions {
    pub const DEFAULT_MAX_DEPTH: usize = 50;

    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            omit_metadata: false,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Builder for creating TransformOptions.
pub struct TransformOptionsBuilder {
    options: TransformOptions,
}

impl TransformOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: TransformOptions::new(),
        }
    }

    pub fn omit_metadata(mut self, omit: bool) -> Self {
        self.options.omit_metadata = omit;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.options.max_depth = depth.max(1);
        self
    }

    pub fn build(self) -> TransformOptions {
        self.options
    }
}

impl Default for TransformOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
