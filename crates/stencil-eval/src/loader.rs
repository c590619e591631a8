//! Import graph loading.
//!
//! `$defs` entries are evaluated in declaration order as they are bound, each
//! seeing only the entries before it. Imports are then fetched one at a time,
//! depth first, in declaration order: a location may interpolate names bound
//! by `$defs` or by earlier imports.

use async_recursion::async_recursion;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use stencil_config::TransformOptions;
use stencil_config::interpolate::{interpolate, referenced_names};
use stencil_core::document::{
    DEFS_KEY, IMPORTS_KEY, LOCATION_KEY, PARAMS_KEY, is_bookkeeping_key, is_extended,
};
use stencil_core::{
    Bindings, Bound, Document, Error, ImportRecord, Mapping, Node, ParamSpec, Resolver, Result,
    Trace,
};

use crate::env::{Env, Path};
use crate::visitor::Visitor;

/// Loads a document and everything it imports.
pub struct Loader<'a> {
    resolver: &'a dyn Resolver,
    visitor: Visitor<'a>,
    max_depth: usize,
    records: Vec<ImportRecord>,
}

impl<'a> Loader<'a> {
    pub fn new(resolver: &'a dyn Resolver, options: &'a TransformOptions) -> Self {
        Self {
            resolver,
            visitor: Visitor::new(options),
            max_depth: options.max_depth,
            records: Vec::new(),
        }
    }

    /// Provenance of every import resolved so far, in resolution order.
    pub fn into_records(self) -> Vec<ImportRecord> {
        self.records
    }

    /// Import records plus the visitor that evaluated `$defs`, so sections
    /// hoisted while binding literals reach the output.
    pub fn finish(self) -> (Vec<ImportRecord>, Visitor<'a>) {
        (self.records, self.visitor)
    }

    /// Load the root document found at `location`.
    pub async fn load(&mut self, map: Mapping, location: &str) -> Result<Document> {
        self.load_at(map, location.to_string(), 0).await
    }

    #[async_recursion]
    async fn load_at(&mut self, map: Mapping, location: String, depth: usize) -> Result<Document> {
        if depth > self.max_depth {
            return Err(Error::RecursionLimit {
                limit: self.max_depth,
                path: location.clone(),
                trace: Trace::default(),
            });
        }

        let location = match map.get(LOCATION_KEY) {
            Some(Node::String(declared)) => declared.clone(),
            _ => location,
        };
        let defs = section_map(&map, DEFS_KEY, &location)?;
        let imports = section_map(&map, IMPORTS_KEY, &location)?;
        let params = parse_params(map.get(PARAMS_KEY), &location)?;
        check_collisions(&defs, &imports, &params, &location)?;

        let mut bindings = Bindings::new();
        for (name, value) in defs {
            let value = match value {
                Node::Map(inline) if is_extended(&inline) => {
                    let doc = self.load_at(inline, location.clone(), depth + 1).await?;
                    Node::Document(Arc::new(doc))
                }
                other => {
                    let env = Env::root(bindings.clone(), &location);
                    let path = Path::root().child(DEFS_KEY).child(&name);
                    self.visitor.eval(&other, &path, &env)?
                }
            };
            bindings = bindings.extend([(name, Bound::Value(value))]);
        }

        for (name, target) in imports {
            let target = match target {
                Node::String(target) => target,
                other => {
                    return Err(Error::malformed(
                        IMPORTS_KEY,
                        format!("{location}.{name}"),
                        format!("import location must be a string, found {}", other.kind()),
                    ));
                }
            };
            let path = format!("{location}.{IMPORTS_KEY}.{name}");
            let depends_on = referenced_names(&target);
            let target = interpolate(&target, &path, |var| plain_lookup(&bindings, var, &path))?;

            let data = self
                .resolver
                .resolve(&target, &location)
                .await
                .map_err(|source| Error::Import {
                    location: target.clone(),
                    importer: location.clone(),
                    source,
                })?;

            let digest = hex::encode(Sha256::digest(&data.raw));
            debug!(
                key = %name,
                from = %location,
                imported = %data.resolved_location,
                digest = %digest,
                depends_on = ?depends_on,
                "Resolved import"
            );
            self.records.push(ImportRecord {
                key: name.clone(),
                from: location.clone(),
                imported: data.resolved_location.clone(),
                digest,
            });

            let value = match data.parsed {
                Node::Map(nested) if is_extended(&nested) => {
                    let doc = self
                        .load_at(nested, data.resolved_location, depth + 1)
                        .await?;
                    Node::Document(Arc::new(doc))
                }
                other => other,
            };
            let scope = bindings.clone();
            bindings = bindings.extend([(name, Bound::Raw(value, scope))]);
        }

        let body = map
            .into_iter()
            .filter(|(k, _)| !is_bookkeeping_key(k))
            .collect();

        Ok(Document {
            location,
            body,
            params,
            bindings,
        })
    }
}

fn section_map(map: &Mapping, key: &str, location: &str) -> Result<Mapping> {
    match map.get(key) {
        None | Some(Node::Null) => Ok(Mapping::new()),
        Some(Node::Map(m)) => Ok(m.clone()),
        Some(other) => Err(Error::malformed(
            key,
            location,
            format!("expected a map, found {}", other.kind()),
        )),
    }
}

fn check_collisions(
    defs: &Mapping,
    imports: &Mapping,
    params: &[ParamSpec],
    location: &str,
) -> Result<()> {
    let collision = |name: &str, message: &str| Error::Collision {
        name: name.to_string(),
        location: location.to_string(),
        message: message.to_string(),
    };

    if let Some(name) = imports.keys().find(|k| defs.contains_key(*k)) {
        return Err(collision(name, "bound in both $defs and $imports"));
    }
    for (i, param) in params.iter().enumerate() {
        if defs.contains_key(&param.name) {
            return Err(collision(&param.name, "parameter shadows a $defs entry"));
        }
        if imports.contains_key(&param.name) {
            return Err(collision(&param.name, "parameter shadows an import"));
        }
        if params[..i].iter().any(|p| p.name == param.name) {
            return Err(collision(&param.name, "parameter declared twice"));
        }
    }
    Ok(())
}

/// Parse a `$params` declaration.
pub fn parse_params(node: Option<&Node>, location: &str) -> Result<Vec<ParamSpec>> {
    let items = match node {
        None | Some(Node::Null) => return Ok(Vec::new()),
        Some(Node::Seq(items)) => items,
        Some(other) => {
            return Err(Error::malformed(
                PARAMS_KEY,
                location,
                format!("expected a sequence, found {}", other.kind()),
            ));
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = format!("{location}.{PARAMS_KEY}.{i}");
            let bad = |message: &str| Error::malformed(PARAMS_KEY, &path, message);
            let map = item.as_map().ok_or_else(|| bad("parameter must be a map"))?;
            let field = |key: &str| map.get(key).or_else(|| map.get(&lower_first(key)));
            let name = field("Name")
                .and_then(Node::as_str)
                .ok_or_else(|| bad("parameter needs a string Name"))?;
            let string_field = |key: &str| -> Result<Option<String>> {
                match field(key) {
                    None => Ok(None),
                    Some(Node::String(s)) => Ok(Some(s.clone())),
                    Some(_) => Err(bad(&format!("{key} must be a string"))),
                }
            };
            let allowed_values = match field("AllowedValues") {
                None => None,
                Some(Node::Seq(values)) => Some(values.clone()),
                Some(_) => return Err(bad("AllowedValues must be a sequence")),
            };
            Ok(ParamSpec {
                name: name.to_string(),
                default: field("Default").cloned(),
                param_type: string_field("Type")?,
                schema: field("Schema").cloned(),
                allowed_values,
                allowed_pattern: string_field("AllowedPattern")?,
            })
        })
        .collect()
}

/// `Name` -> `name`; parameter fields are accepted in either spelling.
fn lower_first(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Dotted lookup over already-bound plain values, used by import locations.
fn plain_lookup(bindings: &Bindings, expr: &str, path: &str) -> Result<Node> {
    let missing = || Error::Lookup {
        name: expr.to_string(),
        path: path.to_string(),
        trace: Trace::default(),
    };
    let mut segments = expr.split('.');
    let first = segments.next().ok_or_else(missing)?;
    let mut current = bindings.get(first).ok_or_else(missing)?.node().clone();

    for segment in segments {
        current = match current {
            Node::Map(mut m) => m.shift_remove(segment).ok_or_else(missing)?,
            Node::Document(doc) => doc.body.get(segment).cloned().ok_or_else(missing)?,
            Node::Seq(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.into_iter().nth(i))
                .ok_or_else(missing)?,
            _ => return Err(missing()),
        };
    }

    match current {
        Node::Tag(_) | Node::Document(_) => Err(Error::malformed(
            IMPORTS_KEY,
            path,
            format!("{expr} is not a plain value and cannot be used in an import location"),
        )),
        plain => Ok(plain),
    }
}
