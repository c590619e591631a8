//! Documents that carry their own scope.

use crate::bindings::Bindings;
use crate::node::{Mapping, Node};

/// Keys holding document bookkeeping. They never appear in output.
pub const IMPORTS_KEY: &str = "$imports";
pub const DEFS_KEY: &str = "$defs";
pub const PARAMS_KEY: &str = "$params";
pub const LOCATION_KEY: &str = "$location";
pub const ENV_VALUES_KEY: &str = "$envValues";

pub const BOOKKEEPING_KEYS: [&str; 5] = [
    IMPORTS_KEY,
    DEFS_KEY,
    PARAMS_KEY,
    LOCATION_KEY,
    ENV_VALUES_KEY,
];

pub fn is_bookkeeping_key(key: &str) -> bool {
    BOOKKEEPING_KEYS.contains(&key)
}

/// True if the map declares imports, literals or parameters.
pub fn is_extended(map: &Mapping) -> bool {
    map.contains_key(IMPORTS_KEY) || map.contains_key(DEFS_KEY) || map.contains_key(PARAMS_KEY)
}

/// A loaded document: its body, declared parameters and captured scope.
///
/// Bindings hold the document's literals and resolved imports. Anything found
/// inside `body` is evaluated in those bindings, never in the referencing scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub location: String,
    /// Document content without bookkeeping keys.
    pub body: Mapping,
    pub params: Vec<ParamSpec>,
    pub bindings: Bindings,
}

impl Document {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// One entry of a `$params` declaration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamSpec {
    pub name: String,
    pub default: Option<Node>,
    pub param_type: Option<String>,
    pub schema: Option<Node>,
    pub allowed_values: Option<Vec<Node>>,
    pub allowed_pattern: Option<String>,
}
