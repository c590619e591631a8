//! Evaluation of stencil documents.
//!
//! A transform runs in three stages:
//! - The loader resolves the import graph and builds each document's scope
//! - The visitor walks the root document, expanding tags and resource templates
//! - The assembler merges hoisted sections and strips bookkeeping keys

pub mod assemble;
mod collections;
pub mod env;
mod intrinsics;
pub mod loader;
pub mod params;
mod resources;
pub mod visitor;

#[cfg(test)]
pub(crate) mod testing;

use tracing::info;

use stencil_config::{TransformOptions, parse_document};
use stencil_core::{Bindings, ImportRecord, Node, Resolver, Result};

pub use env::{Env, Path, PrefixScope};
pub use loader::Loader;
pub use visitor::Visitor;

/// Output of a transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    /// Tag-free document.
    pub document: Node,
    /// Every import resolved while loading, in resolution order.
    pub imports: Vec<ImportRecord>,
}

/// Evaluate a parsed document found at `location`.
pub async fn transform(
    root: Node,
    location: &str,
    resolver: &dyn Resolver,
    options: &TransformOptions,
) -> Result<Transformed> {
    let map = match root {
        Node::Map(map) => map,
        other => {
            let mut visitor = Visitor::new(options);
            let env = Env::root(Bindings::new(), location);
            let document = visitor.eval(&other, &Path::root(), &env)?;
            return Ok(Transformed {
                document,
                imports: Vec::new(),
            });
        }
    };

    let mut loader = Loader::new(resolver, options);
    let doc = loader.load(map, location).await?;
    let (imports, mut visitor) = loader.finish();

    let env = Env::root(doc.bindings.clone(), &doc.location);
    let body = visitor.eval_map(&doc.body, &Path::root(), &env)?;
    let globals = visitor.into_globals();

    let document = assemble::finalize(
        body,
        assemble::is_infrastructure(&doc.body),
        globals,
        &imports,
        options,
    );
    info!(location = %doc.location, imports = imports.len(), "Transformed document");

    Ok(Transformed { document, imports })
}

/// Parse and evaluate document text.
pub async fn transform_text(
    text: &str,
    location: &str,
    resolver: &dyn Resolver,
    options: &TransformOptions,
) -> Result<Transformed> {
    let root = parse_document(text, location)?;
    transform(root, location, resolver, options).await
}

/// Resolve a document's import graph without evaluating it.
pub async fn load_imports(
    text: &str,
    location: &str,
    resolver: &dyn Resolver,
    options: &TransformOptions,
) -> Result<Vec<ImportRecord>> {
    let Node::Map(map) = parse_document(text, location)? else {
        return Ok(Vec::new());
    };
    let mut loader = Loader::new(resolver, options);
    loader.load(map, location).await?;
    Ok(loader.into_records())
}
