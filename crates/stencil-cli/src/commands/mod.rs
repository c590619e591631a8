//! CLI command implementations.

pub mod imports;
pub mod render;

use anyhow::{Context, Result};
use std::io::Read;

/// Document text and the location imports are resolved against.
pub struct Input {
    pub text: String,
    pub location: String,
}

/// Read `path`, or stdin when it is `-`.
pub fn read_input(path: &str) -> Result<Input> {
    let text = if path == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        text
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path))?
    };
    Ok(Input {
        text,
        location: path.to_string(),
    })
}

/// Write to `output`, or stdout when absent.
pub fn write_output(output: Option<&str>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write output: {}", path)),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.yaml");
        std::fs::write(&input, "a: 1\n").unwrap();

        let read = read_input(&input.to_string_lossy()).unwrap();
        assert_eq!(read.text, "a: 1\n");
        assert_eq!(read.location, input.to_string_lossy());

        let output = dir.path().join("out.yaml");
        write_output(Some(&output.to_string_lossy()), "b: 2\n").unwrap();
        assert_eq!(std::fs::read_to_string(output).unwrap(), "b: 2\n");

        assert!(read_input(&dir.path().join("missing.yaml").to_string_lossy()).is_err());
    }
}
