//! In-memory resolver and evaluation helpers for tests.

use async_trait::async_trait;
use std::collections::HashMap;

use stencil_config::{TransformOptions, TransformOptionsBuilder, parse_document};
use stencil_core::{ImportData, ImportFailure, ImportLocation, Node, Resolver, Result, Scheme};

/// Serves documents from a map keyed by resolved location.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    docs: HashMap<String, String>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: &str, text: &str) -> Self {
        self.docs.insert(location.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl Resolver for MemoryResolver {
    async fn resolve(&self, location: &str, base: &str) -> std::result::Result<ImportData, ImportFailure> {
        let loc = ImportLocation::resolve(location, base)?;
        let key = match loc.scheme {
            Scheme::File => loc.path.clone(),
            _ => loc.to_string(),
        };
        let text = self
            .docs
            .get(&key)
            .ok_or_else(|| ImportFailure::NotFound(key.clone()))?;
        let parsed = if [".yaml", ".yml", ".json"].iter().any(|ext| key.ends_with(ext)) {
            parse_document(text, &key).map_err(|e| ImportFailure::Decode(e.to_string()))?
        } else {
            Node::string(text.as_str())
        };
        Ok(ImportData {
            resolved_location: key,
            raw: text.as_bytes().to_vec(),
            parsed,
        })
    }
}

pub fn test_options() -> TransformOptions {
    TransformOptionsBuilder::new()
        .omit_metadata(true)
        .max_depth(16)
        .build()
}

/// Transform `text` as `root.yaml`, with no imports available.
pub async fn eval_text(text: &str) -> Result<Node> {
    eval_with(MemoryResolver::new(), text).await
}

pub async fn eval_with(resolver: MemoryResolver, text: &str) -> Result<Node> {
    crate::transform_text(text, "root.yaml", &resolver, &test_options())
        .await
        .map(|t| t.document)
}
