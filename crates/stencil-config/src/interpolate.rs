//! `{{...}}` interpolation for strings.
//!
//! Supports:
//! - `{{ name }}` and `{{ name.field.0 }}` - dotted lookups
//! - `{{ helper name }}` - one of `toJson`, `toYaml`, `base64`, `toLowerCase`,
//!   `toUpperCase`, `trim`
//!
//! `{{resolve:...}}` dynamic references are left as written.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::sync::LazyLock;
use stencil_core::{Error, Node, Result};

// Regex for matching {{ ... }} placeholders
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").unwrap());

/// String helpers usable inside a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Helper {
    ToJson,
    ToYaml,
    Base64,
    ToLowerCase,
    ToUpperCase,
    Trim,
}

impl Helper {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "toJson" => Helper::ToJson,
            "toYaml" => Helper::ToYaml,
            "base64" => Helper::Base64,
            "toLowerCase" => Helper::ToLowerCase,
            "toUpperCase" => Helper::ToUpperCase,
            "trim" => Helper::Trim,
            _ => return None,
        })
    }

    fn apply(self, value: &Node) -> String {
        match self {
            Helper::ToJson => serde_json::to_string(&value.to_json()).unwrap_or_default(),
            Helper::ToYaml => serde_yaml::to_string(&value.to_yaml())
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default(),
            Helper::Base64 => STANDARD.encode(value.to_text()),
            Helper::ToLowerCase => value.to_text().to_lowercase(),
            Helper::ToUpperCase => value.to_text().to_uppercase(),
            Helper::Trim => value.to_text().trim().to_string(),
        }
    }
}

/// True if `input` holds at least one placeholder.
pub fn has_placeholders(input: &str) -> bool {
    input.contains("{{") && PLACEHOLDER.is_match(input)
}

/// Names referenced by placeholders, in order of appearance.
pub fn referenced_names(input: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(input)
        .filter_map(|caps| {
            let expr = caps[1].trim();
            if expr.starts_with("resolve:") {
                return None;
            }
            expr.split_whitespace().last().map(str::to_string)
        })
        .collect()
}

/// Replace every placeholder in `input`, resolving names through `lookup`.
///
/// `path` is the breadcrumb reported by malformed placeholders.
pub fn interpolate<F>(input: &str, path: &str, mut lookup: F) -> Result<String>
where
    F: FnMut(&str) -> Result<Node>,
{
    let mut out = String::with_capacity(input.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&input[last..whole.start()]);
        last = whole.end();

        let expr = caps[1].trim();
        if expr.starts_with("resolve:") {
            out.push_str(whole.as_str());
            continue;
        }

        let tokens: Vec<&str> = expr.split_whitespace().collect();
        let rendered = match tokens.as_slice() {
            [name] => lookup(name)?.to_text(),
            [helper, name] => {
                let helper = Helper::parse(helper).ok_or_else(|| {
                    Error::malformed("{{}}", path, format!("unknown helper {helper}"))
                })?;
                helper.apply(&lookup(name)?)
            }
            _ => {
                return Err(Error::malformed(
                    "{{}}",
                    path,
                    format!("cannot interpret placeholder {}", whole.as_str()),
                ));
            }
        };
        out.push_str(&rendered);
    }

    out.push_str(&input[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars() -> HashMap<&'static str, Node> {
        HashMap::from([
            ("app", Node::string("web")),
            ("port", Node::int(8080)),
            ("Env", Node::string("Prod")),
            (
                "tags",
                Node::Seq(vec![Node::string("a"), Node::string("b")]),
            ),
        ])
    }

    fn run(input: &str) -> Result<String> {
        let vars = vars();
        interpolate(input, "Root", |name| {
            vars.get(name).cloned().ok_or_else(|| Error::Lookup {
                name: name.to_string(),
                path: "Root".to_string(),
                trace: Default::default(),
            })
        })
    }

    #[test]
    fn test_basic_interpolation() {
        assert_eq!(run("{{app}}:{{ port }}").unwrap(), "web:8080");
    }

    #[test]
    fn test_helpers() {
        assert_eq!(run("{{toLowerCase Env}}").unwrap(), "prod");
        assert_eq!(run("{{toJson tags}}").unwrap(), r#"["a","b"]"#);
        assert_eq!(run("{{base64 app}}").unwrap(), "d2Vi");
    }

    #[test]
    fn test_unknown_variable_is_an_error() {
        let err = run("x {{missing}}").unwrap_err();
        assert!(matches!(err, Error::Lookup { name, .. } if name == "missing"));
    }

    #[test]
    fn test_unknown_helper() {
        assert!(matches!(
            run("{{shout app}}").unwrap_err(),
            Error::MalformedTag { .. }
        ));
    }

    #[test]
    fn test_dynamic_reference_preserved() {
        assert_eq!(
            run("{{resolve:ssm:/db/password:1}}-{{app}}").unwrap(),
            "{{resolve:ssm:/db/password:1}}-web"
        );
    }

    #[test]
    fn test_nested_braces() {
        // Make sure we don't mess up JSON or other nested braces
        assert_eq!(
            run(r#"{"app": "{{app}}"}"#).unwrap(),
            r#"{"app": "web"}"#
        );
    }

    #[test]
    fn test_referenced_names() {
        assert_eq!(
            referenced_names("{{a}} {{toJson b.c}} {{resolve:x}}"),
            vec!["a".to_string(), "b.c".to_string()]
        );
        assert!(has_placeholders("x{{y}}"));
        assert!(!has_placeholders("${Sub}"));
    }
}
