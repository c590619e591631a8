//! `git:branch`, `git:describe` and `git:sha`, read from the importing document's repository.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use stencil_core::{ImportFailure, ImportLocation, Scheme};

use crate::{FetchResult, Fetched, Importer};

pub struct GitImporter;

impl GitImporter {
    fn args(query: &str) -> Option<&'static [&'static str]> {
        Some(match query {
            "branch" => &["rev-parse", "--abbrev-ref", "HEAD"],
            "describe" => &["describe", "--dirty", "--tags"],
            "sha" => &["rev-parse", "HEAD"],
            _ => return None,
        })
    }
}

#[async_trait]
impl Importer for GitImporter {
    fn name(&self) -> &'static str {
        "git"
    }

    fn schemes(&self) -> &'static [Scheme] {
        &[Scheme::Git]
    }

    async fn fetch(&self, location: &ImportLocation) -> FetchResult<Fetched> {
        let args = Self::args(&location.path).ok_or_else(|| {
            ImportFailure::InvalidLocation(format!(
                "git:{} (expected branch, describe or sha)",
                location.path
            ))
        })?;

        let mut command = Command::new("git");
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &location.base_dir {
            command.current_dir(dir);
        }

        debug!(query = %location.path, "Querying git");
        let output = command.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ImportFailure::Request(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Fetched::text(location.to_string(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_query() {
        let loc = ImportLocation::resolve("git:author", "root.yaml").unwrap();
        let err = GitImporter.fetch(&loc).await.unwrap_err();
        assert!(matches!(err, ImportFailure::InvalidLocation(_)));
    }

    #[tokio::test]
    async fn test_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("root.yaml");
        let loc = ImportLocation::resolve("git:sha", &base.to_string_lossy()).unwrap();
        // Either git is missing or the directory is not a repository.
        assert!(GitImporter.fetch(&loc).await.is_err());
    }
}
