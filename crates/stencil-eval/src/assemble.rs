//! Output assembly: global sections, provenance metadata and bookkeeping cleanup.

use indexmap::IndexMap;
use tracing::warn;

use stencil_config::TransformOptions;
use stencil_core::document::is_bookkeeping_key;
use stencil_core::{ImportRecord, Mapping, Node};

use crate::env::PrefixScope;
use crate::resources::take_global;
use crate::visitor::FORMAT_VERSION_KEY;

/// Sections a resource-template instance contributes to the document root.
pub const GLOBAL_SECTIONS: [&str; 6] = [
    "Parameters",
    "Metadata",
    "Mappings",
    "Conditions",
    "Transform",
    "Outputs",
];

pub const FORMAT_VERSION: &str = "2010-09-09";

/// Key under `Metadata` holding render provenance.
pub const METADATA_KEY: &str = "StencilRender";

/// Section entries collected from every template instance in one transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalSections {
    sections: IndexMap<String, Node>,
}

impl GlobalSections {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, section: &str) -> Option<&Node> {
        self.sections.get(section)
    }

    /// Add one instance's evaluated section.
    ///
    /// Map keys are prefixed unless the entry is global; `Transform` values
    /// are collected into a list without duplicates.
    pub fn fold(&mut self, section: &str, value: Node, scope: &PrefixScope) -> Result<(), String> {
        if section == "Transform" {
            let Node::Seq(existing) = self
                .sections
                .entry(section.to_string())
                .or_insert_with(|| Node::Seq(Vec::new()))
            else {
                return Ok(());
            };
            let incoming = match value {
                Node::Seq(items) => items,
                Node::Null => Vec::new(),
                other => vec![other],
            };
            for item in incoming {
                if !existing.contains(&item) {
                    existing.push(item);
                }
            }
            return Ok(());
        }

        let entries = match value {
            Node::Map(entries) => entries,
            Node::Null => return Ok(()),
            other => return Err(format!("{section} must be a map, found {}", other.kind())),
        };
        let Node::Map(target) = self
            .sections
            .entry(section.to_string())
            .or_insert_with(|| Node::Map(Mapping::new()))
        else {
            return Ok(());
        };
        for (name, mut entry) in entries {
            let global = match &mut entry {
                Node::Map(m) => take_global(m),
                _ => false,
            };
            let name = if global { name } else { scope.rewrite(&name) };
            target.insert(name, entry);
        }
        Ok(())
    }
}

/// True if a root document body looks like an infrastructure template.
pub fn is_infrastructure(body: &Mapping) -> bool {
    body.contains_key(FORMAT_VERSION_KEY) || body.contains_key("Resources")
}

/// Produce the final document from the evaluated root body.
///
/// Accumulated entries win over same-named entries already in the output.
pub fn finalize(
    body: Mapping,
    infrastructure: bool,
    globals: GlobalSections,
    records: &[ImportRecord],
    options: &TransformOptions,
) -> Node {
    let mut out = body;

    if !infrastructure && !globals.is_empty() {
        let sections: Vec<&str> = globals.sections.keys().map(String::as_str).collect();
        warn!(
            sections = ?sections,
            "Template instances contributed sections but the root is not an infrastructure document; dropping them"
        );
    }

    if infrastructure {
        if !out.contains_key(FORMAT_VERSION_KEY) {
            out.shift_insert(0, FORMAT_VERSION_KEY.to_string(), Node::string(FORMAT_VERSION));
        }

        for (section, incoming) in globals.sections {
            match (out.get_mut(&section), incoming) {
                (Some(Node::Map(existing)), Node::Map(incoming)) => existing.extend(incoming),
                (Some(Node::Seq(existing)), Node::Seq(incoming)) => {
                    for item in incoming {
                        if !existing.contains(&item) {
                            existing.push(item);
                        }
                    }
                }
                (Some(Node::String(existing)), Node::Seq(mut incoming)) => {
                    let existing = Node::String(existing.clone());
                    if !incoming.contains(&existing) {
                        incoming.insert(0, existing);
                    }
                    out.insert(section, Node::Seq(incoming));
                }
                (_, incoming) => {
                    out.insert(section, incoming);
                }
            }
        }

        if !options.omit_metadata {
            let metadata = out
                .entry("Metadata".to_string())
                .or_insert_with(|| Node::Map(Mapping::new()));
            if let Node::Map(metadata) = metadata {
                metadata.insert(METADATA_KEY.to_string(), render_metadata(records));
            }
        }
    }

    strip_bookkeeping(Node::Map(out))
}

fn render_metadata(records: &[ImportRecord]) -> Node {
    let imports = records
        .iter()
        .map(|record| {
            Node::Map(Mapping::from([
                ("key".to_string(), Node::string(&record.key)),
                ("from".to_string(), Node::string(&record.from)),
                ("imported".to_string(), Node::string(&record.imported)),
                ("sha256".to_string(), Node::string(&record.digest)),
            ]))
        })
        .collect();
    Node::Map(Mapping::from([
        ("Host".to_string(), Node::String(host_name())),
        ("Imports".to_string(), Node::Seq(imports)),
    ]))
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Drop bookkeeping keys at every level.
pub fn strip_bookkeeping(node: Node) -> Node {
    match node {
        Node::Map(map) => Node::Map(
            map.into_iter()
                .filter(|(k, _)| !is_bookkeeping_key(k))
                .map(|(k, v)| (k, strip_bookkeeping(v)))
                .collect(),
        ),
        Node::Seq(items) => Node::Seq(items.into_iter().map(strip_bookkeeping).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn scope() -> PrefixScope {
        PrefixScope {
            prefix: "Web".to_string(),
            exempt: HashSet::new(),
        }
    }

    fn map(text: &str) -> Mapping {
        match stencil_config::parse_document(text, "t.yaml").unwrap() {
            Node::Map(m) => m,
            other => panic!("expected a map, got {other:?}"),
        }
    }

    #[test]
    fn test_fold_prefixes_and_strips_global() {
        let mut globals = GlobalSections::default();
        globals
            .fold(
                "Parameters",
                Node::Map(map("Size: {Type: String}\nShared: {$global: true, Type: String}\n")),
                &scope(),
            )
            .unwrap();
        let params = globals.get("Parameters").unwrap().as_map().unwrap();
        let keys: Vec<_> = params.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["WebSize", "Shared"]);
        assert!(!params["Shared"].as_map().unwrap().contains_key("$global"));
    }

    #[test]
    fn test_fold_transform_is_a_set() {
        let mut globals = GlobalSections::default();
        let serverless = Node::string("AWS::Serverless-2016-10-31");
        globals.fold("Transform", serverless.clone(), &scope()).unwrap();
        globals
            .fold("Transform", Node::Seq(vec![serverless.clone()]), &scope())
            .unwrap();
        assert_eq!(globals.get("Transform"), Some(&Node::Seq(vec![serverless])));
    }

    #[test]
    fn test_accumulator_wins_on_conflict() {
        let mut globals = GlobalSections::default();
        globals
            .fold(
                "Outputs",
                Node::Map(map("Shared: {$global: true, Value: fromTemplate}\n")),
                &scope(),
            )
            .unwrap();
        let body = map("Resources: {}\nOutputs:\n  Shared: {Value: fromRoot}\n  Own: {Value: x}\n");
        let out = finalize(body, true, globals, &[], &TransformOptions::default());
        let outputs = out.as_map().unwrap()["Outputs"].as_map().unwrap();
        assert_eq!(
            outputs["Shared"],
            Node::Map(map("Value: fromTemplate\n"))
        );
        assert!(outputs.contains_key("Own"));
    }

    #[test]
    fn test_infrastructure_documents_gain_version_and_metadata() {
        let records = vec![ImportRecord {
            key: "vars".into(),
            from: "root.yaml".into(),
            imported: "vars.yaml".into(),
            digest: "abc".into(),
        }];
        let out = finalize(
            map("Resources: {}\n"),
            true,
            GlobalSections::default(),
            &records,
            &TransformOptions::default(),
        );
        let root = out.as_map().unwrap();
        assert_eq!(root.get_index(0).unwrap().0, FORMAT_VERSION_KEY);
        let render = root["Metadata"].as_map().unwrap()[METADATA_KEY].as_map().unwrap();
        assert!(render.contains_key("Host"));
        let imports = render["Imports"].as_seq().unwrap();
        assert_eq!(imports[0].as_map().unwrap()["sha256"], Node::string("abc"));

        let quiet = finalize(
            map("Resources: {}\n"),
            true,
            GlobalSections::default(),
            &records,
            &TransformOptions {
                omit_metadata: true,
                ..Default::default()
            },
        );
        assert!(!quiet.as_map().unwrap().contains_key("Metadata"));
    }

    #[test]
    fn test_plain_documents_untouched() {
        let body = map("a: 1\nb: [x]\n");
        let out = finalize(
            body.clone(),
            false,
            GlobalSections::default(),
            &[],
            &TransformOptions::default(),
        );
        assert_eq!(out, Node::Map(body));
    }

    #[test]
    fn test_sections_need_an_infrastructure_root() {
        let mut globals = GlobalSections::default();
        globals
            .fold("Outputs", Node::Map(map("O: {Value: x}\n")), &scope())
            .unwrap();
        assert!(!globals.is_empty());

        let body = map("Wrap:\n  Resources: {}\n");
        let out = finalize(body.clone(), false, globals, &[], &TransformOptions::default());
        assert_eq!(out, Node::Map(body));
    }

    #[test]
    fn test_strip_bookkeeping_is_recursive() {
        let node = Node::Map(map("a:\n  $imports: {x: y}\n  b: [{$defs: {}, c: 1}]\n"));
        assert_eq!(
            strip_bookkeeping(node),
            Node::Map(map("a:\n  b: [{c: 1}]\n"))
        );
    }
}
