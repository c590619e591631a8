//! Local files and content hashes.

use async_recursion::async_recursion;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use stencil_core::{ImportFailure, ImportLocation, Scheme};

use crate::{FetchResult, Fetched, Importer};

/// Value of an optional content hash whose file does not exist.
pub const FILE_MISSING: &str = "FILE_MISSING";

/// Serves `file:`, `filehash:` and `filehash-base64:`.
pub struct FileImporter;

#[async_trait]
impl Importer for FileImporter {
    fn name(&self) -> &'static str {
        "file"
    }

    fn schemes(&self) -> &'static [Scheme] {
        &[Scheme::File, Scheme::FileHash, Scheme::FileHashBase64]
    }

    async fn fetch(&self, location: &ImportLocation) -> FetchResult<Fetched> {
        match location.scheme {
            Scheme::File => {
                let raw = read(Path::new(&location.path)).await?;
                Ok(Fetched::bytes(location.path.clone(), raw))
            }
            _ => {
                let (optional, target) = match location.path.strip_prefix('?') {
                    Some(rest) => (true, rest),
                    None => (false, location.path.as_str()),
                };
                let path = location.local_path(target);
                if !tokio::fs::try_exists(&path).await? {
                    if optional {
                        return Ok(Fetched::text(location.to_string(), FILE_MISSING.to_string()));
                    }
                    return Err(ImportFailure::NotFound(path.display().to_string()));
                }
                let digest = content_hash(&path).await?;
                let text = if location.scheme == Scheme::FileHashBase64 {
                    STANDARD.encode(digest)
                } else {
                    hex::encode(digest)
                };
                Ok(Fetched::text(location.to_string(), text))
            }
        }
    }
}

async fn read(path: &Path) -> FetchResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ImportFailure::NotFound(path.display().to_string()),
        _ => ImportFailure::Io(e),
    })
}

/// sha256 of a file, or for a directory the sha256 of its files' hex
/// digests concatenated in path order.
pub async fn content_hash(path: &Path) -> FetchResult<Vec<u8>> {
    if !tokio::fs::metadata(path).await?.is_dir() {
        return Ok(Sha256::digest(read(path).await?).to_vec());
    }

    let mut files = Vec::new();
    collect_files(path, &mut files).await?;
    files.sort();

    let mut hasher = Sha256::new();
    for file in &files {
        let digest = Sha256::digest(read(file).await?);
        hasher.update(hex::encode(digest).as_bytes());
    }
    Ok(hasher.finalize().to_vec())
}

#[async_recursion]
async fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> FetchResult<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            collect_files(&path, out).await?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
