//! Import listing command.

use anyhow::{Context, Result};
use stencil_config::{OutputFormat, TransformOptionsBuilder};
use stencil_core::ImportRecord;
use stencil_eval::load_imports;
use stencil_resolvers::ResolverRegistry;

use super::{read_input, write_output};

/// Print the import records of one document.
pub async fn run(input: &str, format: OutputFormat, max_depth: usize) -> Result<()> {
    let input = read_input(input)?;
    let options = TransformOptionsBuilder::new().max_depth(max_depth).build();
    let registry = ResolverRegistry::new();

    let records = load_imports(&input.text, &input.location, &registry, &options)
        .await
        .with_context(|| format!("Failed to load imports of {}", input.location))?;
    write_output(None, &format_records(&records, format)?)
}

fn format_records(records: &[ImportRecord], format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(records)?,
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(records)?;
            text.push('\n');
            text
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_records() {
        let records = vec![ImportRecord {
            key: "vars".to_string(),
            from: "root.yaml".to_string(),
            imported: "vars.yaml".to_string(),
            digest: "abc".to_string(),
        }];

        let yaml = format_records(&records, OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("key: vars"));
        assert!(yaml.contains("imported: vars.yaml"));

        let json = format_records(&records, OutputFormat::Json).unwrap();
        let parsed: Vec<ImportRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, records);
    }
}
