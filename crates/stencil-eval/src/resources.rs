//! `Resources` sections: literal resources and resource-template instances.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use stencil_config::interpolate::{has_placeholders, interpolate};
use stencil_core::document::is_bookkeeping_key;
use stencil_core::node::deep_merge;
use stencil_core::{Bound, Document, Error, Mapping, Node, Result, Tag};

use crate::assemble::GLOBAL_SECTIONS;
use crate::env::{Env, Path, PrefixScope};
use crate::visitor::{MERGE_KEY_PREFIX, Visitor, malformed};

/// Marks a template entry whose name is never prefixed.
pub const GLOBAL_MARKER: &str = "$global";

/// Resource type prefixes that are always literal resources.
const LITERAL_TYPE_PREFIXES: [&str; 3] = ["AWS::", "Custom::", "Alexa::"];

/// Template sections whose `$global` entries are exempt from prefixing.
const EXEMPT_SECTIONS: [&str; 4] = ["Parameters", "Resources", "Mappings", "Conditions"];

/// Resource keys holding logical names of sibling resources or conditions.
const NAME_REFERENCE_KEYS: [&str; 2] = ["DependsOn", "Condition"];

enum ResourceKind {
    Literal,
    Template(String, Arc<Document>),
}

impl Visitor<'_> {
    pub(crate) fn eval_resources(
        &mut self,
        resources: &Mapping,
        path: &Path,
        env: &Env,
    ) -> Result<Mapping> {
        let mut out = Mapping::with_capacity(resources.len());
        for (name, resource) in resources {
            if is_bookkeeping_key(name) {
                continue;
            }
            let child = path.child(name);

            if name.starts_with(MERGE_KEY_PREFIX) {
                match self.eval(resource, &child, env)? {
                    Node::Null => {}
                    Node::Map(merged) => deep_merge(&mut out, merged),
                    other => {
                        return Err(malformed(
                            name,
                            &child,
                            env,
                            format!("merge block must evaluate to a map, found {}", other.kind()),
                        ));
                    }
                }
                continue;
            }

            let Node::Map(def) = resource else {
                out.insert(emitted_name(env, name), self.eval(resource, &child, env)?);
                continue;
            };

            match self.classify(name, def, &child, env)? {
                ResourceKind::Literal => {
                    let (emitted, body) = self.eval_literal(name, def, &child, env)?;
                    out.insert(emitted, body);
                }
                ResourceKind::Template(template, doc) => {
                    let instance = self.instantiate(name, def, &template, &doc, &child, env)?;
                    out.extend(instance);
                }
            }
        }
        Ok(out)
    }

    fn classify(&mut self, name: &str, def: &Mapping, path: &Path, env: &Env) -> Result<ResourceKind> {
        let ty = match def.get("Type") {
            None => return Ok(ResourceKind::Literal),
            Some(Node::String(ty)) if has_placeholders(ty) => {
                interpolate(ty, path.as_str(), |expr| self.lookup(expr, path, env))?
            }
            Some(Node::String(ty)) => ty.clone(),
            Some(other) => match other {
                Node::Tag(tag) => match tag.as_ref() {
                    Tag::Include(expr) => expr.clone(),
                    _ => self.eval(other, &path.child("Type"), env)?.to_text(),
                },
                _ => self.eval(other, &path.child("Type"), env)?.to_text(),
            },
        };

        if is_literal_type(&ty) {
            return Ok(ResourceKind::Literal);
        }
        match self.locate(&ty, path, env) {
            Ok(located) => match located.node {
                Node::Document(doc) => Ok(ResourceKind::Template(ty, doc)),
                _ => Err(invalid_resource(name, &ty, path, env)),
            },
            Err(Error::Lookup { .. }) => Err(invalid_resource(name, &ty, path, env)),
            Err(e) => Err(e),
        }
    }

    fn eval_literal(
        &mut self,
        name: &str,
        def: &Mapping,
        path: &Path,
        env: &Env,
    ) -> Result<(String, Node)> {
        let mut def = def.clone();
        let global = take_global(&mut def);
        let mut body = self.eval_map(&def, path, env)?;

        if env.prefix.is_some() {
            for key in NAME_REFERENCE_KEYS {
                if let Some(value) = body.get_mut(key) {
                    rewrite_names(env, value);
                }
            }
        }

        let emitted = if global {
            name.to_string()
        } else {
            emitted_name(env, name)
        };
        Ok((emitted, Node::Map(body)))
    }

    /// Expand one resource-template instance into its prefixed resources.
    ///
    /// Global sections of the template are folded into the accumulator.
    fn instantiate(
        &mut self,
        name: &str,
        def: &Mapping,
        template: &str,
        doc: &Document,
        path: &Path,
        env: &Env,
    ) -> Result<Mapping> {
        let caller_prefix = env
            .prefix
            .as_ref()
            .map(|scope| scope.prefix.as_str())
            .unwrap_or_default();
        let own_prefix = match def.get("NamePrefix") {
            Some(prefix) => self.eval(prefix, &path.child("NamePrefix"), env)?.to_text(),
            None => name.to_string(),
        };
        let prefix = format!("{caller_prefix}{own_prefix}");

        let mut body = doc.body.clone();
        match def.get("Overrides") {
            None => {}
            Some(overrides) => match self.eval(overrides, &path.child("Overrides"), env)? {
                Node::Map(overrides) => deep_merge(&mut body, overrides),
                Node::Null => {}
                other => {
                    return Err(malformed(
                        "Overrides",
                        path,
                        env,
                        format!("expected a map, found {}", other.kind()),
                    ));
                }
            },
        }

        let scope = Arc::new(PrefixScope {
            prefix: prefix.clone(),
            exempt: exempt_names(&body),
        });

        let properties = match def.get("Properties") {
            None => Mapping::new(),
            Some(properties) => match self.eval(properties, &path.child("Properties"), env)? {
                Node::Map(properties) => properties,
                Node::Null => Mapping::new(),
                other => {
                    return Err(malformed(
                        "Properties",
                        path,
                        env,
                        format!("expected a map, found {}", other.kind()),
                    ));
                }
            },
        };

        debug!(resource = %name, template = %template, prefix = %prefix, "Instantiating resource template");

        let values = self.bind_params(doc, properties, name, Some(scope.clone()), path, env)?;
        let mut vars = vec![("Prefix".to_string(), Bound::Value(Node::String(prefix)))];
        vars.extend(values);
        let inner = env
            .enter(
                &doc.location,
                path,
                doc.bindings.extend(vars),
                self.options.max_depth,
            )?
            .with_prefix(Some(scope.clone()));

        let resources = match body.get("Resources") {
            Some(Node::Map(resources)) => {
                self.eval_resources(resources, &path.child("Resources"), &inner)?
            }
            Some(other) => {
                return Err(malformed(
                    "Resources",
                    path,
                    env,
                    format!("template {template} has {} resources", other.kind()),
                ));
            }
            None => Mapping::new(),
        };

        for section in GLOBAL_SECTIONS {
            if let Some(value) = body.get(section) {
                let value = self.eval(value, &path.child(section), &inner)?;
                self.globals
                    .fold(section, value, &scope)
                    .map_err(|message| malformed(section, path, env, message))?;
            }
        }

        Ok(resources)
    }
}

fn is_literal_type(ty: &str) -> bool {
    LITERAL_TYPE_PREFIXES.iter().any(|p| ty.starts_with(p)) || ty.split("::").count() >= 3
}

fn emitted_name(env: &Env, name: &str) -> String {
    match &env.prefix {
        Some(scope) => scope.rewrite(name),
        None => name.to_string(),
    }
}

/// Remove the global marker, returning whether it was set.
pub(crate) fn take_global(def: &mut Mapping) -> bool {
    def.shift_remove(GLOBAL_MARKER)
        .is_some_and(|marker| marker.is_truthy())
}

fn is_global(entry: &Node) -> bool {
    entry
        .as_map()
        .and_then(|m| m.get(GLOBAL_MARKER))
        .is_some_and(Node::is_truthy)
}

fn exempt_names(body: &Mapping) -> HashSet<String> {
    EXEMPT_SECTIONS
        .iter()
        .filter_map(|section| body.get(*section).and_then(Node::as_map))
        .flat_map(|entries| {
            entries
                .iter()
                .filter(|(_, entry)| is_global(entry))
                .map(|(name, _)| name.clone())
        })
        .collect()
}

fn rewrite_names(env: &Env, value: &mut Node) {
    match value {
        Node::String(name) => *name = emitted_name(env, name),
        Node::Seq(items) => items.iter_mut().for_each(|item| rewrite_names(env, item)),
        _ => {}
    }
}

fn invalid_resource(name: &str, ty: &str, path: &Path, env: &Env) -> Error {
    Error::InvalidResource {
        name: name.to_string(),
        resource_type: ty.to_string(),
        path: path.to_string(),
        trace: env.trace(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryResolver, eval_text, eval_with};
    use stencil_config::parse_document;

    const BUCKET_TEMPLATE: &str = concat!(
        "$params:\n",
        "  - Name: Versioned\n",
        "    Default: false\n",
        "Parameters:\n",
        "  Stage:\n",
        "    Type: String\n",
        "  SharedParam:\n",
        "    $global: true\n",
        "    Type: String\n",
        "Resources:\n",
        "  Bucket:\n",
        "    Type: AWS::S3::Bucket\n",
        "    Properties:\n",
        "      Versioning: !$ Versioned\n",
        "  Policy:\n",
        "    Type: AWS::S3::BucketPolicy\n",
        "    DependsOn: Bucket\n",
        "    Properties:\n",
        "      Bucket: !Ref Bucket\n",
        "      Arn: !GetAtt Bucket.Arn\n",
        "      Name: !Sub '{{Prefix}}-${Bucket}-${SharedRole}'\n",
        "  SharedRole:\n",
        "    $global: true\n",
        "    Type: AWS::IAM::Role\n",
        "Outputs:\n",
        "  BucketName:\n",
        "    Value: !Ref Bucket\n",
    );

    fn resolver() -> MemoryResolver {
        MemoryResolver::new().with("bucket.yaml", BUCKET_TEMPLATE)
    }

    fn section<'a>(doc: &'a Node, key: &str) -> &'a Mapping {
        doc.as_map().unwrap()[key].as_map().unwrap()
    }

    #[test]
    fn test_literal_types() {
        assert!(is_literal_type("AWS::S3::Bucket"));
        assert!(is_literal_type("Custom::Thing"));
        assert!(is_literal_type("Vendor::Service::Thing"));
        assert!(!is_literal_type("bucket"));
    }

    #[tokio::test]
    async fn test_instances_are_disjoint() {
        let doc = eval_with(
            resolver(),
            concat!(
                "$imports:\n  bucket: bucket.yaml\n",
                "Resources:\n",
                "  Logs:\n    Type: bucket\n",
                "  Assets:\n    Type: bucket\n    NamePrefix: Static\n",
                "    Properties: {Versioned: true}\n",
            ),
        )
        .await
        .unwrap();

        let resources = section(&doc, "Resources");
        let names: Vec<_> = resources.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec!["LogsBucket", "LogsPolicy", "SharedRole", "StaticBucket", "StaticPolicy"]
        );

        let policy = resources["StaticPolicy"].as_map().unwrap();
        assert_eq!(policy["DependsOn"], Node::string("StaticBucket"));
        let props = policy["Properties"].as_map().unwrap();
        assert_eq!(
            props["Bucket"],
            Node::Map(Mapping::from([("Ref".to_string(), Node::string("StaticBucket"))]))
        );
        assert_eq!(
            props["Arn"],
            Node::Map(Mapping::from([(
                "Fn::GetAtt".to_string(),
                Node::Seq(vec![Node::string("StaticBucket"), Node::string("Arn")])
            )]))
        );
        assert_eq!(
            props["Name"],
            Node::Map(Mapping::from([(
                "Fn::Sub".to_string(),
                Node::string("Static-${StaticBucket}-${SharedRole}")
            )]))
        );

        let logs = resources["LogsBucket"].as_map().unwrap();
        assert_eq!(
            logs["Properties"].as_map().unwrap()["Versioning"],
            Node::Bool(false)
        );
        let assets = resources["StaticBucket"].as_map().unwrap();
        assert_eq!(
            assets["Properties"].as_map().unwrap()["Versioning"],
            Node::Bool(true)
        );
    }

    #[tokio::test]
    async fn test_global_sections_are_hoisted() {
        let doc = eval_with(
            resolver(),
            concat!(
                "$imports:\n  bucket: bucket.yaml\n",
                "Parameters:\n  Root: {Type: String}\n",
                "Resources:\n  Logs:\n    Type: bucket\n",
            ),
        )
        .await
        .unwrap();

        let params: Vec<_> = section(&doc, "Parameters").keys().map(String::as_str).collect();
        assert_eq!(params, vec!["Root", "LogsStage", "SharedParam"]);
        assert!(!section(&doc, "Parameters")["SharedParam"]
            .as_map()
            .unwrap()
            .contains_key(GLOBAL_MARKER));
        assert!(!section(&doc, "Resources")["SharedRole"]
            .as_map()
            .unwrap()
            .contains_key(GLOBAL_MARKER));

        let outputs = section(&doc, "Outputs");
        assert_eq!(
            outputs["LogsBucketName"].as_map().unwrap()["Value"],
            Node::Map(Mapping::from([("Ref".to_string(), Node::string("LogsBucket"))]))
        );
    }

    #[tokio::test]
    async fn test_validation_failure_names_param_and_resource() {
        let resolver = MemoryResolver::new().with(
            "mode.yaml",
            concat!(
                "$params:\n  - Name: Mode\n    AllowedValues: [x, y]\n",
                "Resources:\n  Thing:\n    Type: AWS::SNS::Topic\n",
            ),
        );
        let err = eval_with(
            resolver,
            concat!(
                "$imports:\n  mode: mode.yaml\n",
                "Resources:\n  Mine:\n    Type: mode\n    Properties: {Mode: z}\n",
            ),
        )
        .await
        .unwrap_err();
        match err {
            Error::Validation { param, target, .. } => {
                assert_eq!(param, "Mode");
                assert_eq!(target, "Mine");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_port_default_and_override() {
        let resolver = MemoryResolver::new().with(
            "svc.yaml",
            concat!(
                "$params:\n  - name: Port\n    default: 80\n",
                "Resources:\n  Listener:\n    Type: AWS::ElasticLoadBalancingV2::Listener\n",
                "    Properties:\n      Port: !$ Port\n",
            ),
        );
        let port = |doc: &Node| {
            section(doc, "Resources")["SvcListener"].as_map().unwrap()["Properties"]
                .as_map()
                .unwrap()["Port"]
                .clone()
        };

        let doc = eval_with(
            resolver.clone(),
            "$imports:\n  svc: svc.yaml\nResources:\n  Svc:\n    Type: svc\n",
        )
        .await
        .unwrap();
        assert_eq!(port(&doc), Node::int(80));

        let doc = eval_with(
            resolver,
            "$imports:\n  svc: svc.yaml\nResources:\n  Svc:\n    Type: svc\n    Properties: {Port: 443}\n",
        )
        .await
        .unwrap();
        assert_eq!(port(&doc), Node::int(443));
    }

    #[tokio::test]
    async fn test_unknown_type_is_invalid() {
        let err = eval_text("Resources:\n  X:\n    Type: nothing\n")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidResource { name, resource_type, .. } if name == "X" && resource_type == "nothing"
        ));
    }

    #[tokio::test]
    async fn test_overrides_patch_template() {
        let doc = eval_with(
            resolver(),
            concat!(
                "$imports:\n  bucket: bucket.yaml\n",
                "Resources:\n  Logs:\n    Type: bucket\n",
                "    Overrides:\n      Resources:\n        Bucket:\n          DeletionPolicy: Retain\n",
            ),
        )
        .await
        .unwrap();
        let bucket = section(&doc, "Resources")["LogsBucket"].as_map().unwrap();
        assert_eq!(bucket["DeletionPolicy"], Node::string("Retain"));
        assert_eq!(bucket["Type"], Node::string("AWS::S3::Bucket"));
    }

    #[tokio::test]
    async fn test_nested_templates_compose_prefixes() {
        let resolver = resolver().with(
            "site.yaml",
            concat!(
                "$imports:\n  bucket: bucket.yaml\n",
                "$params: []\n",
                "Resources:\n  Media:\n    Type: bucket\n",
                "  Cdn:\n    Type: AWS::CloudFront::Distribution\n",
                "    Properties: {Origin: !GetAtt MediaBucket.DomainName}\n",
            ),
        );
        let doc = eval_with(
            resolver,
            "$imports:\n  site: site.yaml\nResources:\n  Blog:\n    Type: site\n",
        )
        .await
        .unwrap();
        let resources = section(&doc, "Resources");
        assert!(resources.contains_key("BlogMediaBucket"));
        assert!(resources.contains_key("BlogCdn"));
        let origin = &resources["BlogCdn"].as_map().unwrap()["Properties"]
            .as_map()
            .unwrap()["Origin"];
        assert_eq!(
            origin.as_map().unwrap()["Fn::GetAtt"],
            Node::Seq(vec![Node::string("BlogMediaBucket"), Node::string("DomainName")])
        );
    }

    #[tokio::test]
    async fn test_sub_variables_are_not_prefixed() {
        let resolver = MemoryResolver::new().with(
            "logs.yaml",
            concat!(
                "$params: []\n",
                "Resources:\n",
                "  Bucket:\n    Type: AWS::S3::Bucket\n",
                "  Policy:\n    Type: AWS::S3::BucketPolicy\n",
                "    Properties:\n",
                "      Name: !Sub ['${Local}-${Bucket}', {Local: x}]\n",
            ),
        );
        let doc = eval_with(
            resolver,
            "$imports:\n  logs: logs.yaml\nResources:\n  Logs:\n    Type: logs\n",
        )
        .await
        .unwrap();
        let name = &section(&doc, "Resources")["LogsPolicy"].as_map().unwrap()["Properties"]
            .as_map()
            .unwrap()["Name"];
        assert_eq!(
            name.as_map().unwrap()["Fn::Sub"],
            parse_document("['${Local}-${LogsBucket}', {Local: x}]\n", "x").unwrap()
        );
    }

    #[tokio::test]
    async fn test_resource_merge_block_must_be_a_map() {
        let err = eval_text("Resources:\n  $merge: [1]\n").await.unwrap_err();
        assert!(matches!(err, Error::MalformedTag { .. }));

        let doc = eval_text(concat!(
            "$defs:\n  extra: {Topic: {Type: AWS::SNS::Topic}}\n",
            "Resources:\n  $merge: !$ extra\n  Queue:\n    Type: AWS::SQS::Queue\n",
        ))
        .await
        .unwrap();
        let names: Vec<_> = section(&doc, "Resources").keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Topic", "Queue"]);
    }
}
