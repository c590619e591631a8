//! Evaluation environment: bindings, diagnostic stack and hygiene prefix.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use stencil_core::{Bindings, Bound, Error, Frame, Result, Trace};

/// Dot-joined breadcrumb of the key being evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path(String);

impl Path {
    pub fn root() -> Self {
        Self("Root".to_string())
    }

    pub fn child(&self, segment: impl fmt::Display) -> Self {
        Self(format!("{}.{}", self.0, segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn contains_segment(&self, segment: &str) -> bool {
        self.0.split('.').any(|s| s == segment)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Active resource-template instance: names are rewritten with `prefix`
/// unless listed in `exempt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixScope {
    pub prefix: String,
    pub exempt: HashSet<String>,
}

impl PrefixScope {
    /// Logical name as emitted inside this instance.
    pub fn rewrite(&self, name: &str) -> String {
        if name.starts_with("AWS::") || self.exempt.contains(name) {
            name.to_string()
        } else {
            format!("{}{}", self.prefix, name)
        }
    }
}

/// Lexical environment for one subtree.
///
/// Child environments are fresh values; the parent is never modified.
#[derive(Debug, Clone)]
pub struct Env {
    pub bindings: Bindings,
    pub stack: Vec<Frame>,
    pub prefix: Option<Arc<PrefixScope>>,
    /// Location of the document currently being evaluated.
    pub location: String,
    depth: usize,
}

impl Env {
    pub fn root(bindings: Bindings, location: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            bindings,
            stack: vec![Frame {
                location: location.clone(),
                path: "Root".to_string(),
            }],
            prefix: None,
            location,
            depth: 0,
        }
    }

    /// Same stack and prefix, with extra names in scope.
    pub fn extend<I>(&self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, Bound)>,
    {
        Self {
            bindings: self.bindings.extend(vars),
            ..self.clone()
        }
    }

    /// Enter another document's scope (an include, expansion or template instance).
    ///
    /// Fails once nesting exceeds `limit`; self-referential templates would
    /// otherwise never terminate.
    pub fn enter(&self, location: &str, path: &Path, bindings: Bindings, limit: usize) -> Result<Self> {
        let depth = self.depth + 1;
        if depth > limit {
            return Err(Error::RecursionLimit {
                limit,
                path: path.to_string(),
                trace: self.trace(),
            });
        }
        let mut stack = self.stack.clone();
        stack.push(Frame {
            location: location.to_string(),
            path: path.to_string(),
        });
        Ok(Self {
            bindings,
            stack,
            prefix: self.prefix.clone(),
            location: location.to_string(),
            depth,
        })
    }

    /// Same stack and prefix, resolving names in `bindings` instead.
    pub fn with_bindings(&self, bindings: Bindings) -> Self {
        Self {
            bindings,
            ..self.clone()
        }
    }

    pub fn with_prefix(mut self, prefix: Option<Arc<PrefixScope>>) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn trace(&self) -> Trace {
        Trace(self.stack.clone())
    }
}
