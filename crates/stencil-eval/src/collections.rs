//! Loops and structural combinators.

use indexmap::IndexMap;
use stencil_core::node::deep_merge;
use stencil_core::{Bound, GroupBy, Loop, Mapping, Node, Result};

use crate::env::{Env, Path};
use crate::visitor::{Visitor, malformed};

impl Visitor<'_> {
    /// Evaluate `template` once per element, with the loop variables bound.
    ///
    /// Elements rejected by the filter are skipped but keep their index.
    fn run_loop(
        &mut self,
        l: &Loop,
        items: Vec<Node>,
        path: &Path,
        env: &Env,
    ) -> Result<Vec<Node>> {
        let var = l.var_name();
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let child = path.child(i);
            let scope = loop_scope(env, var, item, i);
            if let Some(filter) = &l.filter {
                if !self.eval(filter, &child.child("filter"), &scope)?.is_truthy() {
                    continue;
                }
            }
            out.push(self.eval(&l.template, &child, &scope)?);
        }
        Ok(out)
    }

    fn loop_items(&mut self, tag: &str, items: &Node, path: &Path, env: &Env) -> Result<Vec<Node>> {
        match self.eval(items, &path.child("items"), env)? {
            Node::Seq(items) => Ok(items),
            Node::Null => Ok(Vec::new()),
            other => Err(malformed(
                tag,
                path,
                env,
                format!("items must be a sequence, found {}", other.kind()),
            )),
        }
    }

    pub(crate) fn eval_map_loop(&mut self, l: &Loop, path: &Path, env: &Env) -> Result<Node> {
        let items = self.loop_items("$map", &l.items, path, env)?;
        self.run_loop(l, items, path, env).map(Node::Seq)
    }

    pub(crate) fn eval_concat_map(&mut self, l: &Loop, path: &Path, env: &Env) -> Result<Node> {
        let items = self.loop_items("$concatMap", &l.items, path, env)?;
        let mut out = Vec::new();
        for result in self.run_loop(l, items, path, env)? {
            match result {
                Node::Seq(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        Ok(Node::Seq(out))
    }

    pub(crate) fn eval_merge_map(&mut self, l: &Loop, path: &Path, env: &Env) -> Result<Node> {
        let items = self.loop_items("$mergeMap", &l.items, path, env)?;
        let results = self.run_loop(l, items, path, env)?;
        merge_all("$mergeMap", results, path, env).map(Node::Map)
    }

    pub(crate) fn eval_map_list_to_hash(
        &mut self,
        l: &Loop,
        path: &Path,
        env: &Env,
    ) -> Result<Node> {
        let items = self.loop_items("$mapListToHash", &l.items, path, env)?;
        let results = self.run_loop(l, items, path, env)?;
        pairs_to_map("$mapListToHash", results, path, env).map(Node::Map)
    }

    /// Loop over a map's entries; each element is `{key, value}` and each
    /// result replaces the entry's value.
    pub(crate) fn eval_map_values(&mut self, l: &Loop, path: &Path, env: &Env) -> Result<Node> {
        let entries = match self.eval(&l.items, &path.child("items"), env)? {
            Node::Map(m) => m,
            Node::Null => Mapping::new(),
            other => {
                return Err(malformed(
                    "$mapValues",
                    path,
                    env,
                    format!("items must be a map, found {}", other.kind()),
                ));
            }
        };
        let keys: Vec<String> = entries.keys().cloned().collect();
        let items = entries
            .into_iter()
            .map(|(key, value)| {
                Node::Map(Mapping::from([
                    ("key".to_string(), Node::String(key)),
                    ("value".to_string(), value),
                ]))
            })
            .collect();
        let results = self.run_loop(l, items, path, env)?;
        Ok(Node::Map(keys.into_iter().zip(results).collect()))
    }

    pub(crate) fn eval_group_by(&mut self, g: &GroupBy, path: &Path, env: &Env) -> Result<Node> {
        let items = self.loop_items("$groupBy", &g.items, path, env)?;
        let var = g.var.as_deref().unwrap_or(Loop::DEFAULT_VAR);

        let mut groups: IndexMap<String, Vec<Node>> = IndexMap::new();
        for (i, item) in items.into_iter().enumerate() {
            let child = path.child(i);
            let scope = loop_scope(env, var, item.clone(), i);
            let key = self.eval(&g.key, &child.child("key"), &scope)?.to_text();
            let member = match &g.template {
                Some(template) => self.eval(template, &child, &scope)?,
                None => item,
            };
            groups.entry(key).or_default().push(member);
        }
        Ok(Node::Map(
            groups
                .into_iter()
                .map(|(k, members)| (k, Node::Seq(members)))
                .collect(),
        ))
    }

    pub(crate) fn eval_concat(&mut self, payload: &Node, path: &Path, env: &Env) -> Result<Node> {
        let parts = self.eval_seq("$concat", payload, path, env)?;
        let mut out = Vec::new();
        for (i, part) in parts.into_iter().enumerate() {
            match part {
                Node::Seq(items) => out.extend(items),
                other => {
                    return Err(malformed(
                        "$concat",
                        &path.child(i),
                        env,
                        format!("expected a sequence, found {}", other.kind()),
                    ));
                }
            }
        }
        Ok(Node::Seq(out))
    }

    pub(crate) fn eval_merge(&mut self, payload: &Node, path: &Path, env: &Env) -> Result<Node> {
        let parts = self.eval_seq("$merge", payload, path, env)?;
        merge_all("$merge", parts, path, env).map(Node::Map)
    }

    pub(crate) fn eval_from_pairs(
        &mut self,
        payload: &Node,
        path: &Path,
        env: &Env,
    ) -> Result<Node> {
        let pairs = self.eval_seq("$fromPairs", payload, path, env)?;
        pairs_to_map("$fromPairs", pairs, path, env).map(Node::Map)
    }

    /// Split on a literal delimiter, dropping empty segments left by trailing delimiters.
    pub(crate) fn eval_split(
        &mut self,
        delimiter: &Node,
        value: &Node,
        path: &Path,
        env: &Env,
    ) -> Result<Node> {
        let delimiter = self.eval(delimiter, &path.child(0), env)?;
        let value = self.eval(value, &path.child(1), env)?;
        let (Node::String(delimiter), Node::String(value)) = (delimiter, value) else {
            return Err(malformed(
                "$split",
                path,
                env,
                "delimiter and value must be strings",
            ));
        };
        if delimiter.is_empty() {
            return Err(malformed("$split", path, env, "delimiter must not be empty"));
        }

        let mut parts: Vec<&str> = value.split(delimiter.as_str()).collect();
        while parts.last().is_some_and(|p| p.is_empty()) {
            parts.pop();
        }
        Ok(Node::Seq(parts.into_iter().map(Node::string).collect()))
    }

    fn eval_seq(&mut self, tag: &str, payload: &Node, path: &Path, env: &Env) -> Result<Vec<Node>> {
        match self.eval(payload, path, env)? {
            Node::Seq(items) => Ok(items),
            other => Err(malformed(
                tag,
                path,
                env,
                format!("expected a sequence, found {}", other.kind()),
            )),
        }
    }
}

fn loop_scope(env: &Env, var: &str, item: Node, index: usize) -> Env {
    env.extend([
        (var.to_string(), Bound::Value(item)),
        (format!("{var}Idx"), Bound::Value(Node::int(index as i64))),
    ])
}

/// Deep-merge a sequence of maps, later entries winning. Nulls are skipped.
fn merge_all(tag: &str, parts: Vec<Node>, path: &Path, env: &Env) -> Result<Mapping> {
    let mut out = Mapping::new();
    for (i, part) in parts.into_iter().enumerate() {
        match part {
            Node::Map(m) => deep_merge(&mut out, m),
            Node::Null => {}
            other => {
                return Err(malformed(
                    tag,
                    &path.child(i),
                    env,
                    format!("expected a map, found {}", other.kind()),
                ));
            }
        }
    }
    Ok(out)
}

/// Build a map from `{key, value}` maps or `[key, value]` pairs.
fn pairs_to_map(tag: &str, pairs: Vec<Node>, path: &Path, env: &Env) -> Result<Mapping> {
    let mut out = Mapping::with_capacity(pairs.len());
    for (i, pair) in pairs.into_iter().enumerate() {
        let entry = match pair {
            Node::Map(mut m) if m.len() == 2 && m.contains_key("key") && m.contains_key("value") => {
                let key = m.shift_remove("key").unwrap_or(Node::Null);
                let value = m.shift_remove("value").unwrap_or(Node::Null);
                Some((key, value))
            }
            Node::Seq(items) if items.len() == 2 => {
                let mut items = items.into_iter();
                items.next().zip(items.next())
            }
            _ => None,
        };
        let Some((key, value)) = entry else {
            return Err(malformed(
                tag,
                &path.child(i),
                env,
                "expected a {key, value} map or a [key, value] pair",
            ));
        };
        out.insert(key.to_text(), value);
    }
    Ok(out)
}
