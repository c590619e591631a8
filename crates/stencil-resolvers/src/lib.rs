//! Import resolvers for stencil.
//!
//! Each importer serves one or more location schemes. A [`ResolverRegistry`]
//! routes a location to its importer and derives the structured value from
//! the fetched bytes.

pub mod aws;
pub mod env;
pub mod file;
pub mod git;
pub mod http;
pub mod random;
pub mod registry;

use async_trait::async_trait;
use stencil_core::{ImportFailure, ImportLocation, Node, Scheme};

pub use registry::ResolverRegistry;

pub type FetchResult<T> = std::result::Result<T, ImportFailure>;

/// Content fetched for one location.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Location reported in provenance records.
    pub resolved: String,
    pub raw: Vec<u8>,
    /// Structured value, when the importer knows it. Otherwise the registry
    /// derives one from the resolved location's extension.
    pub parsed: Option<Node>,
}

impl Fetched {
    pub fn bytes(resolved: impl Into<String>, raw: Vec<u8>) -> Self {
        Self {
            resolved: resolved.into(),
            raw,
            parsed: None,
        }
    }

    /// A plain text value.
    pub fn text(resolved: impl Into<String>, text: String) -> Self {
        Self {
            resolved: resolved.into(),
            raw: text.clone().into_bytes(),
            parsed: Some(Node::String(text)),
        }
    }
}

/// Loader for one family of location schemes.
#[async_trait]
pub trait Importer: Send + Sync {
    /// Returns the importer name for logging.
    fn name(&self) -> &'static str;

    /// Schemes this importer serves.
    fn schemes(&self) -> &'static [Scheme];

    async fn fetch(&self, location: &ImportLocation) -> FetchResult<Fetched>;
}
