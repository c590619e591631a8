//! `!Ref`, `!GetAtt` and `!Sub`, rewritten inside resource-template instances.

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

use stencil_core::{Mapping, Node, Result};

use crate::env::{Env, Path, PrefixScope};
use crate::visitor::{Visitor, malformed};

// ${Name} or ${Name.Attr}; ${!Literal} is an escape and never rewritten
static SUB_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}!][^}]*)\}").unwrap());

fn long_form(key: &str, value: Node) -> Node {
    Node::Map(Mapping::from([(key.to_string(), value)]))
}

impl Visitor<'_> {
    pub(crate) fn eval_ref(&mut self, payload: &Node, path: &Path, env: &Env) -> Result<Node> {
        let value = match self.eval(payload, path, env)? {
            Node::String(name) => Node::String(rewrite(env, &name)),
            other => other,
        };
        Ok(long_form("Ref", value))
    }

    /// `Resource.Attr` and `[Resource, Attr]` are both emitted as a two-element list.
    pub(crate) fn eval_get_att(&mut self, payload: &Node, path: &Path, env: &Env) -> Result<Node> {
        let value = match self.eval(payload, path, env)? {
            Node::String(target) => {
                let Some((resource, attribute)) = target.split_once('.') else {
                    return Err(malformed(
                        "GetAtt",
                        path,
                        env,
                        format!("expected Resource.Attribute, found {target}"),
                    ));
                };
                Node::Seq(vec![
                    Node::String(rewrite(env, resource)),
                    Node::string(attribute),
                ])
            }
            Node::Seq(mut parts) => {
                if let Some(Node::String(resource)) = parts.first_mut() {
                    *resource = rewrite(env, resource);
                }
                Node::Seq(parts)
            }
            other => other,
        };
        Ok(long_form("Fn::GetAtt", value))
    }

    /// Names bound in the explicit variable map of the two-argument form are
    /// left alone.
    pub(crate) fn eval_sub(&mut self, payload: &Node, path: &Path, env: &Env) -> Result<Node> {
        let value = match self.eval(payload, path, env)? {
            Node::String(text) => Node::String(rewrite_sub(env, &text, &HashSet::new())),
            Node::Seq(mut parts) if parts.len() == 2 => {
                let bound: HashSet<String> = parts[1]
                    .as_map()
                    .map(|vars| vars.keys().cloned().collect())
                    .unwrap_or_default();
                if let Node::String(text) = &mut parts[0] {
                    *text = rewrite_sub(env, text, &bound);
                }
                Node::Seq(parts)
            }
            other => other,
        };
        Ok(long_form("Fn::Sub", value))
    }
}

fn rewrite(env: &Env, name: &str) -> String {
    match &env.prefix {
        Some(scope) => scope.rewrite(name),
        None => name.to_string(),
    }
}

fn rewrite_sub(env: &Env, text: &str, bound: &HashSet<String>) -> String {
    let Some(scope) = &env.prefix else {
        return text.to_string();
    };
    SUB_REFERENCE
        .replace_all(text, |caps: &Captures| rewrite_reference(scope, &caps[1], bound))
        .into_owned()
}

fn rewrite_reference(scope: &PrefixScope, reference: &str, bound: &HashSet<String>) -> String {
    let name = reference.split('.').next().unwrap_or(reference);
    if bound.contains(name) {
        return format!("${{{reference}}}");
    }
    format!("${{{}{}}}", scope.rewrite(name), &reference[name.len()..])
}
