//! Client abstractions used by remote import schemes.
//!
//! Concrete cloud clients live outside this workspace; a registry is handed
//! implementations of these traits.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ImportFailure;

pub type ClientResult<T> = std::result::Result<T, ImportFailure>;

/// Object storage (`s3://bucket/key`).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<Vec<u8>>;
}

/// Hierarchical parameter store (`ssm:` and `ssm-path:`).
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Fetch a single parameter value.
    async fn get_parameter(&self, name: &str, decrypt: bool) -> ClientResult<String>;

    /// Fetch every parameter below `path`, recursively. Names are returned in full.
    async fn get_parameters_by_path(
        &self,
        path: &str,
        decrypt: bool,
    ) -> ClientResult<Vec<(String, String)>>;
}

/// Description of a deployed stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackDescription {
    pub name: String,
    pub outputs: IndexMap<String, String>,
    pub parameters: IndexMap<String, String>,
    pub tags: IndexMap<String, String>,
    /// Logical id to resource summary.
    pub resources: IndexMap<String, serde_json::Value>,
    /// Full provider description.
    pub raw: serde_json::Value,
}

/// Live infrastructure introspection (`cfn:`).
#[async_trait]
pub trait StackInspector: Send + Sync {
    async fn describe_stack(&self, name: &str) -> ClientResult<StackDescription>;

    /// Value of a named cross-stack export.
    async fn export_value(&self, name: &str) -> ClientResult<Option<String>>;
}
