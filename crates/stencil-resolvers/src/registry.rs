//! Scheme-to-importer routing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use stencil_config::{parse_document, parse_json};
use stencil_core::clients::{ObjectStore, ParameterStore, StackInspector};
use stencil_core::{ImportData, ImportFailure, ImportLocation, Node, Resolver, Scheme};

use crate::aws::{CfnImporter, S3Importer, SsmImporter};
use crate::env::EnvImporter;
use crate::file::FileImporter;
use crate::git::GitImporter;
use crate::http::HttpImporter;
use crate::random::RandomImporter;
use crate::{Fetched, Importer};

/// Routes locations to importers by scheme.
///
/// Local schemes and HTTP are registered by default. Object store, parameter
/// store and stack introspection need a client.
pub struct ResolverRegistry {
    importers: HashMap<Scheme, Arc<dyn Importer>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(FileImporter));
        registry.register(Arc::new(EnvImporter));
        registry.register(Arc::new(GitImporter));
        registry.register(Arc::new(RandomImporter));
        registry.register(Arc::new(HttpImporter::new()));
        registry
    }

    /// Registry with no importers at all.
    pub fn empty() -> Self {
        Self {
            importers: HashMap::new(),
        }
    }

    /// Register an importer for every scheme it serves, replacing earlier ones.
    pub fn register(&mut self, importer: Arc<dyn Importer>) {
        for scheme in importer.schemes() {
            self.importers.insert(*scheme, importer.clone());
        }
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.register(Arc::new(S3Importer::new(store)));
        self
    }

    pub fn with_parameter_store(mut self, store: Arc<dyn ParameterStore>) -> Self {
        self.register(Arc::new(SsmImporter::new(store)));
        self
    }

    pub fn with_stack_inspector(mut self, inspector: Arc<dyn StackInspector>) -> Self {
        self.register(Arc::new(CfnImporter::new(inspector)));
        self
    }

    pub fn supports(&self, scheme: Scheme) -> bool {
        self.importers.contains_key(&scheme)
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for ResolverRegistry {
    async fn resolve(&self, location: &str, base: &str) -> Result<ImportData, ImportFailure> {
        let location = ImportLocation::resolve(location, base)?;
        let importer = self
            .importers
            .get(&location.scheme)
            .ok_or(ImportFailure::NotConfigured(location.scheme.as_str()))?;

        debug!(location = %location, importer = importer.name(), "Fetching import");
        let Fetched {
            resolved,
            raw,
            parsed,
        } = importer.fetch(&location).await?;

        let parsed = match parsed {
            Some(parsed) => parsed,
            None => sniff(&resolved, &raw)?,
        };
        Ok(ImportData {
            resolved_location: resolved,
            raw,
            parsed,
        })
    }
}

/// Derive a structured value from the location's extension.
pub fn sniff(location: &str, raw: &[u8]) -> Result<Node, ImportFailure> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    let decode = |e: stencil_core::Error| ImportFailure::Decode(e.to_string());

    match extension.as_deref() {
        Some("yaml" | "yml") => {
            let text = std::str::from_utf8(raw)
                .map_err(|e| ImportFailure::Decode(format!("{location}: {e}")))?;
            parse_document(text, location).map_err(decode)
        }
        Some("json") => parse_json(raw, location).map_err(decode),
        _ => Ok(Node::String(String::from_utf8_lossy(raw).into_owned())),
    }
}
