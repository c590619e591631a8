//! The document tree.

use indexmap::IndexMap;
use serde_yaml::Number;
use std::sync::Arc;

use crate::document::Document;
use crate::tag::Tag;

/// Ordered string-keyed map. Insertion order is kept for output.
pub type Mapping = IndexMap<String, Node>;

/// A value in a source or output document.
///
/// Source trees may contain `Tag` and `Document` nodes. Evaluated trees
/// contain neither, except for payloads passed through `!$escape`.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Seq(Vec<Node>),
    Map(Mapping),
    Tag(Box<Tag>),
    /// An imported document together with the scope it was loaded in.
    Document(Arc<Document>),
}

impl Node {
    pub fn string(s: impl Into<String>) -> Self {
        Node::String(s.into())
    }

    pub fn int(i: i64) -> Self {
        Node::Number(Number::from(i))
    }

    pub fn tag(tag: Tag) -> Self {
        Node::Tag(Box::new(tag))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match self {
            Node::Seq(s) => Some(s),
            _ => None,
        }
    }

    /// Short human name of the node kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Number(_) => "number",
            Node::String(_) => "string",
            Node::Seq(_) => "sequence",
            Node::Map(_) => "map",
            Node::Tag(_) => "tag",
            Node::Document(_) => "document",
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Node::Null | Node::Bool(_) | Node::Number(_) | Node::String(_)
        )
    }

    /// Truthiness for `!$if`, `!$not` and loop filters.
    ///
    /// `null`, `false`, zero and the empty string are false; everything else
    /// (including empty collections) is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Node::Null => false,
            Node::Bool(b) => *b,
            Node::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Node::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Textual form of a scalar. Collections render as compact JSON.
    pub fn to_text(&self) -> String {
        match self {
            Node::Null => "null".to_string(),
            Node::Bool(b) => b.to_string(),
            Node::Number(n) => n.to_string(),
            Node::String(s) => s.clone(),
            other => serde_json::to_string(&other.to_json()).unwrap_or_default(),
        }
    }

    /// Convert to a JSON value. Tags render as single-key `{"!name": payload}` maps.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::from(i)
                } else if let Some(u) = n.as_u64() {
                    Value::from(u)
                } else {
                    n.as_f64()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            Node::String(s) => Value::String(s.clone()),
            Node::Seq(items) => Value::Array(items.iter().map(Node::to_json).collect()),
            Node::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Node::Tag(tag) => {
                let mut obj = serde_json::Map::new();
                obj.insert(format!("!{}", tag.name()), tag.payload().to_json());
                Value::Object(obj)
            }
            Node::Document(doc) => Node::Map(doc.body.clone()).to_json(),
        }
    }

    /// Convert a plain JSON value into a node.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Number(Number::from(i))
                } else if let Some(u) = n.as_u64() {
                    Node::Number(Number::from(u))
                } else {
                    Node::Number(Number::from(n.as_f64().unwrap_or(0.0)))
                }
            }
            Value::String(s) => Node::String(s.clone()),
            Value::Array(items) => Node::Seq(items.iter().map(Node::from_json).collect()),
            Value::Object(obj) => Node::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Node::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a YAML value for serialization. Tags are kept as YAML tags.
    pub fn to_yaml(&self) -> serde_yaml::Value {
        use serde_yaml::Value;
        use serde_yaml::value::{Tag as YamlTag, TaggedValue};
        match self {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Seq(items) => Value::Sequence(items.iter().map(Node::to_yaml).collect()),
            Node::Map(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| (Value::String(k.clone()), v.to_yaml()))
                    .collect(),
            ),
            Node::Tag(tag) => Value::Tagged(Box::new(TaggedValue {
                tag: YamlTag::new(tag.name()),
                value: tag.payload().to_yaml(),
            })),
            Node::Document(doc) => Node::Map(doc.body.clone()).to_yaml(),
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<Mapping> for Node {
    fn from(m: Mapping) -> Self {
        Node::Map(m)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Seq(items)
    }
}

/// Deep-merge `from` into `into`. Nested maps merge key by key; any other
/// value in `from` replaces the one in `into`.
pub fn deep_merge(into: &mut Mapping, from: Mapping) {
    for (key, value) in from {
        match (into.get_mut(&key), value) {
            (Some(Node::Map(existing)), Node::Map(incoming)) => deep_merge(existing, incoming),
            (_, value) => {
                into.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Node)]) -> Mapping {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_truthiness() {
        assert!(!Node::Null.is_truthy());
        assert!(!Node::Bool(false).is_truthy());
        assert!(!Node::int(0).is_truthy());
        assert!(!Node::string("").is_truthy());
        assert!(Node::string("no").is_truthy());
        assert!(Node::Seq(vec![]).is_truthy());
    }

    #[test]
    fn test_deep_merge_later_wins() {
        let mut base = map(&[
            ("a", Node::int(1)),
            ("nested", Node::Map(map(&[("x", Node::int(1)), ("y", Node::int(2))]))),
        ]);
        deep_merge(
            &mut base,
            map(&[
                ("a", Node::int(91)),
                ("nested", Node::Map(map(&[("y", Node::int(20))]))),
            ]),
        );
        assert_eq!(base["a"], Node::int(91));
        let nested = base["nested"].as_map().unwrap();
        assert_eq!(nested["x"], Node::int(1));
        assert_eq!(nested["y"], Node::int(20));
    }

    #[test]
    fn test_json_conversion() {
        let node = Node::Map(map(&[
            ("name", Node::string("web")),
            ("ports", Node::Seq(vec![Node::int(80), Node::int(443)])),
        ]));
        let json = node.to_json();
        assert_eq!(json, serde_json::json!({"name": "web", "ports": [80, 443]}));
        assert_eq!(Node::from_json(&json), node);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Node::int(42).to_text(), "42");
        assert_eq!(Node::Bool(true).to_text(), "true");
        assert_eq!(
            Node::Seq(vec![Node::string("a")]).to_text(),
            r#"["a"]"#.to_string()
        );
    }
}
