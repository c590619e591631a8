//! Tree-walking evaluator.

use std::sync::Arc;
use tracing::warn;

use stencil_config::TransformOptions;
use stencil_config::interpolate::{has_placeholders, interpolate};
use stencil_config::parse_document;
use stencil_core::document::is_bookkeeping_key;
use stencil_core::node::deep_merge;
use stencil_core::{Bound, Document, Error, Let, Mapping, Node, Result, Tag};

use crate::assemble::GlobalSections;
use crate::env::{Env, Path, PrefixScope};
use crate::params::validate_param;

/// Output key whose date value is normalized to a calendar date.
pub const FORMAT_VERSION_KEY: &str = "AWSTemplateFormatVersion";

/// Keys starting with this marker are evaluated and merged into their parent map.
pub const MERGE_KEY_PREFIX: &str = "$merge";

/// Evaluates nodes against an environment.
///
/// Evaluation never mutates its input. The only state is the accumulator of
/// global sections contributed by resource-template instances.
pub struct Visitor<'a> {
    pub(crate) options: &'a TransformOptions,
    pub(crate) globals: GlobalSections,
}

/// A name resolved to a node and the scope that node evaluates in.
pub(crate) struct Located {
    pub node: Node,
    pub scope: Env,
    pub evaluated: bool,
}

enum Segment<'e> {
    Name(&'e str),
    Dynamic(&'e str),
}

impl<'a> Visitor<'a> {
    pub fn new(options: &'a TransformOptions) -> Self {
        Self {
            options,
            globals: GlobalSections::default(),
        }
    }

    pub fn into_globals(self) -> GlobalSections {
        self.globals
    }

    pub fn eval(&mut self, node: &Node, path: &Path, env: &Env) -> Result<Node> {
        match node {
            Node::Null | Node::Bool(_) | Node::Number(_) => Ok(node.clone()),
            Node::String(s) => self.eval_string(s, path, env),
            Node::Seq(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.eval(item, &path.child(i), env))
                .collect::<Result<Vec<_>>>()
                .map(Node::Seq),
            Node::Map(map) => self.eval_map(map, path, env).map(Node::Map),
            Node::Tag(tag) => self.eval_tag(tag, path, env),
            Node::Document(doc) => {
                let inner = self.enter_document(doc, path, env)?;
                self.eval_map(&doc.body, path, &inner).map(Node::Map)
            }
        }
    }

    fn eval_string(&mut self, s: &str, path: &Path, env: &Env) -> Result<Node> {
        if !has_placeholders(s) {
            return Ok(Node::string(s));
        }
        let rendered = interpolate(s, path.as_str(), |expr| self.lookup(expr, path, env))?;
        Ok(Node::String(rendered))
    }

    pub(crate) fn eval_map(&mut self, map: &Mapping, path: &Path, env: &Env) -> Result<Mapping> {
        let mut out = Mapping::with_capacity(map.len());
        for (key, value) in map {
            if is_bookkeeping_key(key) {
                continue;
            }
            let child = path.child(key);

            if key.starts_with(MERGE_KEY_PREFIX) {
                match self.eval(value, &child, env)? {
                    Node::Null => {}
                    Node::Map(m) => deep_merge(&mut out, m),
                    other => {
                        return Err(malformed(
                            key,
                            &child,
                            env,
                            format!("merge block must evaluate to a map, found {}", other.kind()),
                        ));
                    }
                }
                continue;
            }

            let evaluated = match value {
                Node::Map(resources) if key == "Resources" && !path.contains_segment("Overrides") => {
                    Node::Map(self.eval_resources(resources, &child, env)?)
                }
                _ if key == FORMAT_VERSION_KEY => normalize_date(self.eval(value, &child, env)?),
                _ => self.eval(value, &child, env)?,
            };
            let key = if has_placeholders(key) {
                interpolate(key, child.as_str(), |expr| self.lookup(expr, &child, env))?
            } else {
                key.clone()
            };
            out.insert(key, evaluated);
        }
        Ok(out)
    }

    fn eval_tag(&mut self, tag: &Tag, path: &Path, env: &Env) -> Result<Node> {
        match tag {
            Tag::Include(expr) => self.lookup(expr, path, env),
            Tag::Expand { template, params } => self.expand(template, params, path, env),
            Tag::Escape(payload) => Ok(payload.clone()),
            Tag::StringCoerce(payload) => Ok(match self.eval(payload, path, env)? {
                Node::String(s) => Node::String(s),
                other => Node::String(other.to_text()),
            }),
            Tag::ParseYaml(payload) => match self.eval(payload, path, env)? {
                Node::String(text) => {
                    let parsed = parse_document(&text, &env.location)?;
                    self.eval(&parsed, path, env)
                }
                other => Err(malformed(
                    tag.name(),
                    path,
                    env,
                    format!("expected a string, found {}", other.kind()),
                )),
            },
            Tag::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, &path.child("test"), env)?.is_truthy() {
                    self.eval(then, &path.child("then"), env)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise, &path.child("else"), env)
                } else {
                    Ok(Node::Null)
                }
            }
            Tag::Eq(a, b) => {
                let a = self.eval(a, &path.child(0), env)?;
                let b = self.eval(b, &path.child(1), env)?;
                Ok(Node::Bool(a == b))
            }
            Tag::Not(payload) => {
                let value = match self.eval(payload, path, env)? {
                    Node::Seq(mut items) if items.len() == 1 => items.remove(0),
                    other => other,
                };
                Ok(Node::Bool(!value.is_truthy()))
            }
            Tag::Let(binding) => self.eval_let(binding, path, env),
            Tag::Map(l) => self.eval_map_loop(l, path, env),
            Tag::MapValues(l) => self.eval_map_values(l, path, env),
            Tag::ConcatMap(l) => self.eval_concat_map(l, path, env),
            Tag::MergeMap(l) => self.eval_merge_map(l, path, env),
            Tag::MapListToHash(l) => self.eval_map_list_to_hash(l, path, env),
            Tag::GroupBy(g) => self.eval_group_by(g, path, env),
            Tag::Concat(payload) => self.eval_concat(payload, path, env),
            Tag::Merge(payload) => self.eval_merge(payload, path, env),
            Tag::FromPairs(payload) => self.eval_from_pairs(payload, path, env),
            Tag::Split { delimiter, value } => self.eval_split(delimiter, value, path, env),
            Tag::Ref(payload) => self.eval_ref(payload, path, env),
            Tag::GetAtt(payload) => self.eval_get_att(payload, path, env),
            Tag::Sub(payload) => self.eval_sub(payload, path, env),
            Tag::Intrinsic(intrinsic, payload) => {
                let value = self.eval(payload, path, env)?;
                Ok(Node::Map(Mapping::from([(intrinsic.long_name(), value)])))
            }
        }
    }

    fn eval_let(&mut self, binding: &Let, path: &Path, env: &Env) -> Result<Node> {
        let mut vars = Vec::with_capacity(binding.bindings.len());
        for (name, value) in &binding.bindings {
            let value = self.eval(value, &path.child(name), env)?;
            vars.push((name.clone(), Bound::Value(value)));
        }
        let inner = env.extend(vars);
        self.eval(&binding.body, &path.child(Let::BODY_KEY), &inner)
    }

    /// `!$expand`: evaluate a named template document with parameters.
    fn expand(&mut self, template: &Node, params: &Node, path: &Path, env: &Env) -> Result<Node> {
        let (name, doc) = self.template_document(template, path, env)?;
        let caller = match self.eval(params, &path.child("params"), env)? {
            Node::Map(m) => m,
            Node::Null => Mapping::new(),
            other => {
                return Err(malformed(
                    "$expand",
                    path,
                    env,
                    format!("params must be a map, found {}", other.kind()),
                ));
            }
        };
        let values = self.bind_params(&doc, caller, &name, env.prefix.clone(), path, env)?;
        let inner = env.enter(
            &doc.location,
            path,
            doc.bindings.extend(values),
            self.options.max_depth,
        )?;
        self.eval_map(&doc.body, path, &inner).map(Node::Map)
    }

    /// Resolve a template reference (a name or an include) to its document.
    pub(crate) fn template_document(
        &mut self,
        template: &Node,
        path: &Path,
        env: &Env,
    ) -> Result<(String, Arc<Document>)> {
        let name = match template {
            Node::String(s) => s.trim().to_string(),
            Node::Tag(tag) => match tag.as_ref() {
                Tag::Include(expr) => expr.clone(),
                _ => self.eval(template, path, env)?.to_text(),
            },
            other => {
                return Err(malformed(
                    "$expand",
                    path,
                    env,
                    format!("template must name a document, found {}", other.kind()),
                ));
            }
        };
        match self.locate(&name, path, env)?.node {
            Node::Document(doc) => Ok((name, doc)),
            other => Err(malformed(
                "$expand",
                path,
                env,
                format!("{name} is a {}, not a template document", other.kind()),
            )),
        }
    }

    /// Compute a template's parameter values and validate them.
    ///
    /// Defaults are evaluated in the template's own scope; caller values win.
    /// Undeclared caller values are passed through with a warning.
    pub(crate) fn bind_params(
        &mut self,
        doc: &Document,
        mut caller: Mapping,
        target: &str,
        prefix: Option<Arc<PrefixScope>>,
        path: &Path,
        env: &Env,
    ) -> Result<Vec<(String, Bound)>> {
        for name in caller.keys().filter(|k| doc.param(k).is_none()) {
            warn!(param = %name, template = %doc.location, instance = %target, "Undeclared template parameter");
        }

        let defaults_env = env
            .enter(
                &doc.location,
                path,
                doc.bindings.clone(),
                self.options.max_depth,
            )?
            .with_prefix(prefix);

        let mut values = Vec::with_capacity(doc.params.len() + caller.len());
        for param in &doc.params {
            let value = match caller.shift_remove(&param.name) {
                Some(value) => Some(value),
                None => match &param.default {
                    Some(default) => {
                        Some(self.eval(default, &path.child(&param.name), &defaults_env)?)
                    }
                    None => None,
                },
            };
            validate_param(param, value.as_ref()).map_err(|message| Error::Validation {
                param: param.name.clone(),
                target: target.to_string(),
                path: path.to_string(),
                message,
                trace: env.trace(),
            })?;
            if let Some(value) = value {
                values.push((param.name.clone(), Bound::Value(value)));
            }
        }
        values.extend(caller.into_iter().map(|(k, v)| (k, Bound::Value(v))));
        Ok(values)
    }

    fn enter_document(&self, doc: &Document, path: &Path, env: &Env) -> Result<Env> {
        env.enter(
            &doc.location,
            path,
            doc.bindings.clone(),
            self.options.max_depth,
        )
    }

    /// Evaluate a dotted reference such as `vars.region` or `zones[env].cidr`.
    pub(crate) fn lookup(&mut self, expr: &str, path: &Path, env: &Env) -> Result<Node> {
        let at = self.locate(expr, path, env)?;
        if at.evaluated {
            return Ok(at.node);
        }
        let scope = at.scope.enter(
            &at.scope.location,
            path,
            at.scope.bindings.clone(),
            self.options.max_depth,
        )?;
        self.eval(&at.node, path, &scope)
    }

    /// Walk a dotted reference without evaluating its final value.
    pub(crate) fn locate(&mut self, expr: &str, path: &Path, env: &Env) -> Result<Located> {
        let not_found = || Error::Lookup {
            name: expr.to_string(),
            path: path.to_string(),
            trace: env.trace(),
        };
        let segments = parse_segments(expr)
            .ok_or_else(|| malformed("$", path, env, format!("invalid lookup path {expr}")))?;
        let mut segments = segments.into_iter();

        let Some(Segment::Name(head)) = segments.next() else {
            return Err(malformed("$", path, env, format!("invalid lookup path {expr}")));
        };
        let mut at = match env.bindings.get(head).ok_or_else(not_found)? {
            Bound::Raw(node, scope) => Located {
                node: node.clone(),
                scope: env.with_bindings(scope.clone()),
                evaluated: false,
            },
            Bound::Value(node) => Located {
                node: node.clone(),
                scope: env.clone(),
                evaluated: true,
            },
        };

        for segment in segments {
            let key = match segment {
                Segment::Name(name) => name.to_string(),
                Segment::Dynamic(inner) => self.lookup(inner, path, env)?.to_text(),
            };
            at = self.descend(at, &key, path)?.ok_or_else(not_found)?;
        }
        Ok(at)
    }

    fn descend(&mut self, mut at: Located, key: &str, path: &Path) -> Result<Option<Located>> {
        loop {
            let node = std::mem::replace(&mut at.node, Node::Null);
            match node {
                Node::Tag(_) if !at.evaluated => {
                    at.node = self.eval(&node, path, &at.scope)?;
                    at.evaluated = true;
                }
                Node::Document(doc) => {
                    at.scope = self.enter_document(&doc, path, &at.scope)?;
                    at.node = Node::Map(doc.body.clone());
                }
                Node::Map(mut map) => {
                    return Ok(map.shift_remove(key).map(|node| Located { node, ..at }));
                }
                Node::Seq(items) => {
                    let found = key
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| items.into_iter().nth(i));
                    return Ok(found.map(|node| Located { node, ..at }));
                }
                _ => return Ok(None),
            }
        }
    }
}

/// Split `a.b[c.d].e` into names and bracketed sub-expressions.
fn parse_segments(expr: &str) -> Option<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    let mut rest = expr.trim();

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let mut depth = 1;
            let end = after.char_indices().find_map(|(i, c)| {
                match c {
                    '[' => depth += 1,
                    ']' => depth -= 1,
                    _ => {}
                }
                (depth == 0).then_some(i)
            })?;
            let inner = after[..end].trim();
            if inner.is_empty() {
                return None;
            }
            out.push(Segment::Dynamic(inner));
            rest = &after[end + 1..];
        } else {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            if end == 0 {
                return None;
            }
            out.push(Segment::Name(&rest[..end]));
            rest = &rest[end..];
        }
        if let Some(next) = rest.strip_prefix('.') {
            if next.is_empty() {
                return None;
            }
            rest = next;
        }
    }
    Some(out)
}

/// Timestamps in the format-version field become `YYYY-MM-DD`.
fn normalize_date(value: Node) -> Node {
    match value {
        Node::String(s)
            if s.len() > 10
                && s.is_char_boundary(10)
                && s.as_bytes()[4] == b'-'
                && s.as_bytes()[7] == b'-' =>
        {
            Node::String(s[..10].to_string())
        }
        other => other,
    }
}

pub(crate) fn malformed(tag: &str, path: &Path, env: &Env, message: impl Into<String>) -> Error {
    Error::MalformedTag {
        tag: format!("!{}", tag.trim_start_matches('!')),
        path: path.to_string(),
        message: message.into(),
        trace: env.trace(),
    }
}
