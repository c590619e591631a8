//! Document rendering command.

use anyhow::{Context, Result};
use stencil_config::{OutputFormat, TransformOptionsBuilder, render};
use stencil_eval::transform_text;
use stencil_resolvers::ResolverRegistry;
use tracing::info;

use super::{read_input, write_output};

/// Render one document and write it out.
pub async fn run(
    input: &str,
    output: Option<&str>,
    format: OutputFormat,
    omit_metadata: bool,
    max_depth: usize,
) -> Result<()> {
    let input = read_input(input)?;
    let options = TransformOptionsBuilder::new()
        .omit_metadata(omit_metadata)
        .max_depth(max_depth)
        .build();
    let registry = ResolverRegistry::new();

    let transformed = transform_text(&input.text, &input.location, &registry, &options)
        .await
        .with_context(|| format!("Failed to render {}", input.location))?;
    info!(
        location = %input.location,
        imports = transformed.imports.len(),
        "Rendered document"
    );

    let text = render(&transformed.document, format)?;
    write_output(output, &text)
}
