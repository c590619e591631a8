//! Import locations, provenance records and the resolver contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ImportFailure;
use crate::node::Node;

/// Import scheme selected by a location's `scheme:` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    File,
    Env,
    Git,
    Random,
    FileHash,
    FileHashBase64,
    S3,
    Http,
    Https,
    Ssm,
    SsmPath,
    Cfn,
}

impl Scheme {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "file" => Scheme::File,
            "env" => Scheme::Env,
            "git" => Scheme::Git,
            "random" => Scheme::Random,
            "filehash" => Scheme::FileHash,
            "filehash-base64" => Scheme::FileHashBase64,
            "s3" => Scheme::S3,
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            "ssm" => Scheme::Ssm,
            "ssm-path" => Scheme::SsmPath,
            "cfn" => Scheme::Cfn,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::File => "file",
            Scheme::Env => "env",
            Scheme::Git => "git",
            Scheme::Random => "random",
            Scheme::FileHash => "filehash",
            Scheme::FileHashBase64 => "filehash-base64",
            Scheme::S3 => "s3",
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Ssm => "ssm",
            Scheme::SsmPath => "ssm-path",
            Scheme::Cfn => "cfn",
        }
    }

    /// Schemes whose documents are fetched from elsewhere.
    pub fn is_remote(self) -> bool {
        matches!(self, Scheme::S3 | Scheme::Http | Scheme::Https)
    }

    /// Schemes a remote document may never use.
    pub fn is_local_only(self) -> bool {
        matches!(self, Scheme::File | Scheme::Env)
    }

    /// Schemes whose location is a full URL rather than `scheme:rest`.
    fn is_url(self) -> bool {
        self.is_remote()
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A location with its scheme resolved against the importing document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLocation {
    pub scheme: Scheme,
    /// Text after `scheme:`; the full URL for remote schemes; the joined path for files.
    pub path: String,
    /// Directory of the importing document when it is a local file.
    pub base_dir: Option<PathBuf>,
}

impl ImportLocation {
    /// Resolve `location` as imported from the document at `base`.
    pub fn resolve(location: &str, base: &str) -> Result<Self, ImportFailure> {
        let location = location.trim();
        let base_loc = Self::of_document(base);
        let base_dir = base_loc.as_ref().and_then(|b| b.local_dir());
        let base_remote = base_loc.as_ref().filter(|b| b.scheme.is_remote());

        match split_scheme(location)? {
            Some((scheme, rest)) => {
                if scheme.is_local_only() && base_remote.is_some() {
                    return Err(ImportFailure::Forbidden(location.to_string()));
                }
                let path = match scheme {
                    s if s.is_url() => location.to_string(),
                    Scheme::File => join_local(base_dir.as_deref(), rest),
                    _ => rest.to_string(),
                };
                Ok(Self {
                    scheme,
                    path,
                    base_dir,
                })
            }
            None => match base_remote {
                Some(remote) => {
                    let base_url = url::Url::parse(&remote.path)
                        .map_err(|e| ImportFailure::InvalidLocation(format!("{base}: {e}")))?;
                    let joined = base_url
                        .join(location)
                        .map_err(|e| ImportFailure::InvalidLocation(format!("{location}: {e}")))?;
                    Ok(Self {
                        scheme: remote.scheme,
                        path: joined.to_string(),
                        base_dir: None,
                    })
                }
                None => Ok(Self {
                    scheme: Scheme::File,
                    path: join_local(base_dir.as_deref(), location),
                    base_dir,
                }),
            },
        }
    }

    /// Interpret the location of an already-loaded document.
    fn of_document(base: &str) -> Option<Self> {
        if base.is_empty() || base == "-" {
            return None;
        }
        match split_scheme(base) {
            Ok(Some((scheme, rest))) => Some(Self {
                scheme,
                path: if scheme.is_url() {
                    base.to_string()
                } else {
                    rest.to_string()
                },
                base_dir: None,
            }),
            Ok(None) | Err(_) => Some(Self {
                scheme: Scheme::File,
                path: base.to_string(),
                base_dir: None,
            }),
        }
    }

    fn local_dir(&self) -> Option<PathBuf> {
        if self.scheme != Scheme::File {
            return None;
        }
        Path::new(&self.path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    /// Local path relative to the importing document.
    pub fn local_path(&self, path: &str) -> PathBuf {
        PathBuf::from(join_local(self.base_dir.as_deref(), path))
    }
}

impl fmt::Display for ImportLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme.is_url() {
            f.write_str(&self.path)
        } else {
            write!(f, "{}:{}", self.scheme, self.path)
        }
    }
}

fn split_scheme(location: &str) -> Result<Option<(Scheme, &str)>, ImportFailure> {
    let Some((head, rest)) = location.split_once(':') else {
        return Ok(None);
    };
    let looks_like_scheme = !head.is_empty()
        && head
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !looks_like_scheme {
        return Ok(None);
    }
    match Scheme::parse(head) {
        Some(scheme) => Ok(Some((scheme, rest))),
        None => Err(ImportFailure::UnknownScheme(head.to_string())),
    }
}

fn join_local(base_dir: Option<&Path>, path: &str) -> String {
    let p = Path::new(path);
    match base_dir {
        Some(dir) if p.is_relative() => dir.join(p).to_string_lossy().into_owned(),
        _ => path.to_string(),
    }
}

/// Provenance of one resolved import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Name the import was bound to.
    pub key: String,
    /// Location of the importing document.
    pub from: String,
    /// Resolved location of the imported value.
    pub imported: String,
    /// Hex sha256 of the raw bytes.
    pub digest: String,
}

/// Result of resolving one location.
#[derive(Debug, Clone)]
pub struct ImportData {
    pub resolved_location: String,
    pub raw: Vec<u8>,
    /// Best-effort structured value.
    pub parsed: Node,
}

/// Maps a location string to its content.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `location` as imported by the document at `base`.
    async fn resolve(&self, location: &str, base: &str) -> Result<ImportData, ImportFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_path_is_file_relative_to_importer() {
        let loc = ImportLocation::resolve("vars.yaml", "templates/root.yaml").unwrap();
        assert_eq!(loc.scheme, Scheme::File);
        assert_eq!(loc.path, Path::new("templates").join("vars.yaml").to_string_lossy());
    }

    #[test]
    fn test_explicit_scheme() {
        let loc = ImportLocation::resolve("env:HOME:/tmp", "root.yaml").unwrap();
        assert_eq!(loc.scheme, Scheme::Env);
        assert_eq!(loc.path, "HOME:/tmp");
    }

    #[test]
    fn test_unknown_scheme() {
        let err = ImportLocation::resolve("ftp:thing", "root.yaml").unwrap_err();
        assert!(matches!(err, ImportFailure::UnknownScheme(s) if s == "ftp"));
    }

    #[test]
    fn test_remote_base_inherits_scheme() {
        let loc =
            ImportLocation::resolve("common/vpc.yaml", "s3://bucket/stacks/app.yaml").unwrap();
        assert_eq!(loc.scheme, Scheme::S3);
        assert_eq!(loc.path, "s3://bucket/stacks/common/vpc.yaml");

        let loc = ImportLocation::resolve("../shared.yaml", "https://example.com/a/b/c.yaml")
            .unwrap();
        assert_eq!(loc.scheme, Scheme::Https);
        assert_eq!(loc.path, "https://example.com/a/shared.yaml");
    }

    #[test]
    fn test_remote_base_cannot_read_local() {
        for location in ["env:SECRET", "file:/etc/passwd"] {
            let err = ImportLocation::resolve(location, "https://example.com/t.yaml").unwrap_err();
            assert!(matches!(err, ImportFailure::Forbidden(_)));
        }
        let loc = ImportLocation::resolve("ssm:/app/key", "https://example.com/t.yaml").unwrap();
        assert_eq!(loc.scheme, Scheme::Ssm);
    }
}
