//! Core types for the stencil template preprocessor.
//!
//! This crate contains:
//! - The document tree (`Node`) and the closed set of macro tags
//! - Lexical bindings and documents that carry their own scope
//! - Import locations, provenance records and the resolver traits
//! - Error kinds shared by every stage of a transform

pub mod bindings;
pub mod clients;
pub mod document;
pub mod error;
pub mod import;
pub mod node;
pub mod tag;

pub use bindings::{Bindings, Bound};
pub use document::{Document, ParamSpec};
pub use error::{Error, Frame, ImportFailure, Result, Trace};
pub use import::{ImportData, ImportLocation, ImportRecord, Resolver, Scheme};
pub use node::{Mapping, Node};
pub use tag::{GroupBy, Intrinsic, Let, Loop, Tag};
