//! Error types for stencil.
//!
//! Every error is fatal to the transform that raised it.

use std::fmt;
use thiserror::Error;

/// One entry of the diagnostic stack: which document and which key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub location: String,
    pub path: String,
}

/// Diagnostic stack carried by evaluation errors, innermost frame last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace(pub Vec<Frame>);

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in self.0.iter().rev() {
            write!(f, "\n  in {} at {}", frame.location, frame.path)?;
        }
        Ok(())
    }
}

/// Failure reported by an import resolver.
#[derive(Debug, Error)]
pub enum ImportFailure {
    #[error("unknown import scheme \"{0}\"")]
    UnknownScheme(String),

    #[error("remote documents may not import local location {0}")]
    Forbidden(String),

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no {0} client configured")]
    NotConfigured(&'static str),

    #[error("request failed: {0}")]
    Request(String),

    #[error("could not decode: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not import {location} (imported from {importer}): {source}")]
    Import {
        location: String,
        importer: String,
        #[source]
        source: ImportFailure,
    },

    #[error("{name} is not defined, at {path}{trace}")]
    Lookup {
        name: String,
        path: String,
        trace: Trace,
    },

    #[error("{name} is declared more than once in {location}: {message}")]
    Collision {
        name: String,
        location: String,
        message: String,
    },

    #[error("malformed {tag} at {path}: {message}{trace}")]
    MalformedTag {
        tag: String,
        path: String,
        message: String,
        trace: Trace,
    },

    #[error("invalid parameter {param} for {target}: {message}, at {path}{trace}")]
    Validation {
        param: String,
        target: String,
        path: String,
        message: String,
        trace: Trace,
    },

    #[error("invalid resource type {resource_type} for {name}, at {path}{trace}")]
    InvalidResource {
        name: String,
        resource_type: String,
        path: String,
        trace: Trace,
    },

    #[error("expansion depth limit of {limit} exceeded at {path}{trace}")]
    RecursionLimit {
        limit: usize,
        path: String,
        trace: Trace,
    },

    #[error("could not parse {location}: {message}")]
    Parse { location: String, message: String },
}

impl Error {
    /// Malformed-tag error without a diagnostic stack, used while building nodes from text.
    pub fn malformed(tag: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MalformedTag {
            tag: tag.into(),
            path: path.into(),
            message: message.into(),
            trace: Trace::default(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_lists_innermost_first() {
        let trace = Trace(vec![
            Frame {
                location: "root.yaml".into(),
                path: "Root".into(),
            },
            Frame {
                location: "child.yaml".into(),
                path: "Root.Resources.Bucket".into(),
            },
        ]);
        let err = Error::Lookup {
            name: "missing".into(),
            path: "Root.Resources.Bucket.Properties".into(),
            trace,
        };
        let text = err.to_string();
        let child = text.find("child.yaml").unwrap();
        let root = text.find("root.yaml").unwrap();
        assert!(child < root);
        assert!(text.starts_with("missing is not defined"));
    }
}
