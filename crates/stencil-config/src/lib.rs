//! Document text handling for stencil.
//!
//! This crate handles:
//! - Parsing YAML/JSON text into tagged document trees
//! - `{{...}}` string interpolation
//! - Transform options

pub mod interpolate;
pub mod options;
pub mod yaml;

pub use options::{TransformOptions, TransformOptionsBuilder};
pub use yaml::{OutputFormat, parse_document, parse_json, render};
