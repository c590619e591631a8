//! Object store, parameter store and live stack importers.
//!
//! These wrap the client traits from `stencil_core::clients`; the registry only
//! carries them when a client was supplied.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use stencil_config::{parse_document, parse_json};
use stencil_core::clients::{ObjectStore, ParameterStore, StackInspector};
use stencil_core::{ImportFailure, ImportLocation, Mapping, Node, Scheme};

use crate::{FetchResult, Fetched, Importer};

/// `s3://bucket/key`.
pub struct S3Importer {
    store: Arc<dyn ObjectStore>,
}

impl S3Importer {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Importer for S3Importer {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn schemes(&self) -> &'static [Scheme] {
        &[Scheme::S3]
    }

    async fn fetch(&self, location: &ImportLocation) -> FetchResult<Fetched> {
        let url = url::Url::parse(&location.path)
            .map_err(|e| ImportFailure::InvalidLocation(format!("{}: {e}", location.path)))?;
        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ImportFailure::InvalidLocation(format!("{}: no bucket", location.path)))?;
        let key = url.path().trim_start_matches('/');
        if key.is_empty() {
            return Err(ImportFailure::InvalidLocation(format!(
                "{}: no key",
                location.path
            )));
        }

        debug!(bucket, key, "Fetching object");
        let raw = self.store.get_object(bucket, key).await?;
        Ok(Fetched::bytes(location.path.clone(), raw))
    }
}

/// How a parameter value is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueFormat {
    Text,
    Json,
    Yaml,
}

impl ValueFormat {
    /// Split an optional `:json` or `:yaml` suffix off a parameter location.
    fn split(path: &str) -> (&str, Self) {
        if let Some(name) = path.strip_suffix(":json") {
            (name, ValueFormat::Json)
        } else if let Some(name) = path.strip_suffix(":yaml") {
            (name, ValueFormat::Yaml)
        } else {
            (path, ValueFormat::Text)
        }
    }

    fn decode(self, value: &str, location: &str) -> FetchResult<Node> {
        let decode = |e: stencil_core::Error| ImportFailure::Decode(e.to_string());
        match self {
            ValueFormat::Text => Ok(Node::string(value)),
            ValueFormat::Json => parse_json(value.as_bytes(), location).map_err(decode),
            ValueFormat::Yaml => parse_document(value, location).map_err(decode),
        }
    }
}

/// `ssm:<name>` and `ssm-path:<path>`, always decrypted.
pub struct SsmImporter {
    store: Arc<dyn ParameterStore>,
}

impl SsmImporter {
    pub fn new(store: Arc<dyn ParameterStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Importer for SsmImporter {
    fn name(&self) -> &'static str {
        "ssm"
    }

    fn schemes(&self) -> &'static [Scheme] {
        &[Scheme::Ssm, Scheme::SsmPath]
    }

    async fn fetch(&self, location: &ImportLocation) -> FetchResult<Fetched> {
        let resolved = location.to_string();
        let (name, format) = ValueFormat::split(&location.path);

        if location.scheme == Scheme::Ssm {
            let value = self.store.get_parameter(name, true).await?;
            let parsed = format.decode(&value, &resolved)?;
            return Ok(Fetched {
                resolved,
                raw: value.into_bytes(),
                parsed: Some(parsed),
            });
        }

        let prefix = name.trim_end_matches('/');
        let mut values = Mapping::new();
        let mut raw = serde_json::Map::new();
        for (full, value) in self.store.get_parameters_by_path(name, true).await? {
            let short = full
                .strip_prefix(prefix)
                .unwrap_or(&full)
                .trim_start_matches('/')
                .to_string();
            values.insert(short, format.decode(&value, &full)?);
            raw.insert(full, serde_json::Value::String(value));
        }
        let raw = serde_json::to_vec(&raw).map_err(|e| ImportFailure::Decode(e.to_string()))?;
        Ok(Fetched {
            resolved,
            raw,
            parsed: Some(Node::Map(values)),
        })
    }
}

/// `cfn:<kind>:<stack>/<key>`, `cfn:stack:<stack>` and `cfn:export:<name>`.
pub struct CfnImporter {
    inspector: Arc<dyn StackInspector>,
}

impl CfnImporter {
    pub fn new(inspector: Arc<dyn StackInspector>) -> Self {
        Self { inspector }
    }
}

#[async_trait]
impl Importer for CfnImporter {
    fn name(&self) -> &'static str {
        "cfn"
    }

    fn schemes(&self) -> &'static [Scheme] {
        &[Scheme::Cfn]
    }

    async fn fetch(&self, location: &ImportLocation) -> FetchResult<Fetched> {
        let resolved = location.to_string();
        let invalid = || ImportFailure::InvalidLocation(resolved.clone());
        let (kind, rest) = location.path.split_once(':').ok_or_else(invalid)?;

        if kind == "export" {
            let value = self
                .inspector
                .export_value(rest)
                .await?
                .ok_or_else(|| ImportFailure::NotFound(format!("export {rest}")))?;
            return Ok(Fetched::text(resolved, value));
        }

        if kind == "stack" {
            let description = self.inspector.describe_stack(rest).await?;
            return Ok(json_value(resolved, &description.raw));
        }

        let (stack, key) = rest.split_once('/').ok_or_else(invalid)?;
        let description = self.inspector.describe_stack(stack).await?;
        let missing = || ImportFailure::NotFound(format!("{kind} {key} of stack {stack}"));
        let found = match kind {
            "output" => description.outputs.get(key),
            "parameter" => description.parameters.get(key),
            "tag" => description.tags.get(key),
            "resource" => {
                let resource = description.resources.get(key).ok_or_else(missing)?;
                return Ok(json_value(resolved, resource));
            }
            _ => return Err(invalid()),
        };
        let value = found.ok_or_else(missing)?;
        Ok(Fetched::text(resolved, value.clone()))
    }
}

fn json_value(resolved: String, value: &serde_json::Value) -> Fetched {
    Fetched {
        resolved,
        raw: value.to_string().into_bytes(),
        parsed: Some(Node::from_json(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_core::clients::{ClientResult, StackDescription};

    fn location(text: &str) -> ImportLocation {
        ImportLocation::resolve(text, "root.yaml").unwrap()
    }

    struct Objects;

    #[async_trait]
    impl ObjectStore for Objects {
        async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<Vec<u8>> {
            match (bucket, key) {
                ("configs", "stacks/app.yaml") => Ok(b"a: 1\n".to_vec()),
                _ => Err(ImportFailure::NotFound(format!("s3://{bucket}/{key}"))),
            }
        }
    }

    struct Parameters;

    #[async_trait]
    impl ParameterStore for Parameters {
        async fn get_parameter(&self, name: &str, decrypt: bool) -> ClientResult<String> {
            assert!(decrypt);
            match name {
                "/app/name" => Ok("shop".to_string()),
                "/app/settings" => Ok(r#"{"replicas": 3}"#.to_string()),
                _ => Err(ImportFailure::NotFound(name.to_string())),
            }
        }

        async fn get_parameters_by_path(
            &self,
            path: &str,
            decrypt: bool,
        ) -> ClientResult<Vec<(String, String)>> {
            assert!(decrypt);
            assert_eq!(path, "/app/db");
            Ok(vec![
                ("/app/db/host".to_string(), "db.internal".to_string()),
                ("/app/db/pool/size".to_string(), "10".to_string()),
            ])
        }
    }

    struct Stacks;

    #[async_trait]
    impl StackInspector for Stacks {
        async fn describe_stack(&self, name: &str) -> ClientResult<StackDescription> {
            if name != "network" {
                return Err(ImportFailure::NotFound(format!("stack {name}")));
            }
            let mut description = StackDescription {
                name: name.to_string(),
                raw: serde_json::json!({"StackName": "network", "StackStatus": "CREATE_COMPLETE"}),
                ..Default::default()
            };
            description
                .outputs
                .insert("VpcId".to_string(), "vpc-123".to_string());
            description.resources.insert(
                "Vpc".to_string(),
                serde_json::json!({"PhysicalResourceId": "vpc-123"}),
            );
            Ok(description)
        }

        async fn export_value(&self, name: &str) -> ClientResult<Option<String>> {
            Ok((name == "network-VpcId").then(|| "vpc-123".to_string()))
        }
    }

    #[tokio::test]
    async fn test_s3() {
        let importer = S3Importer::new(Arc::new(Objects));
        let fetched = importer
            .fetch(&location("s3://configs/stacks/app.yaml"))
            .await
            .unwrap();
        assert_eq!(fetched.resolved, "s3://configs/stacks/app.yaml");
        assert_eq!(fetched.raw, b"a: 1\n");

        let err = importer.fetch(&location("s3://configs")).await.unwrap_err();
        assert!(matches!(err, ImportFailure::InvalidLocation(_)));
    }

    #[tokio::test]
    async fn test_ssm_formats() {
        let importer = SsmImporter::new(Arc::new(Parameters));
        let fetched = importer.fetch(&location("ssm:/app/name")).await.unwrap();
        assert_eq!(fetched.parsed, Some(Node::string("shop")));

        let fetched = importer
            .fetch(&location("ssm:/app/settings:json"))
            .await
            .unwrap();
        let parsed = fetched.parsed.unwrap();
        assert_eq!(parsed.as_map().unwrap()["replicas"], Node::int(3));
    }

    #[tokio::test]
    async fn test_ssm_path_strips_prefix() {
        let importer = SsmImporter::new(Arc::new(Parameters));
        let fetched = importer
            .fetch(&location("ssm-path:/app/db"))
            .await
            .unwrap();
        let parsed = fetched.parsed.unwrap();
        let map = parsed.as_map().unwrap();
        assert_eq!(map["host"], Node::string("db.internal"));
        assert_eq!(map["pool/size"], Node::string("10"));
    }

    #[tokio::test]
    async fn test_cfn_lookups() {
        let importer = CfnImporter::new(Arc::new(Stacks));

        let fetched = importer
            .fetch(&location("cfn:output:network/VpcId"))
            .await
            .unwrap();
        assert_eq!(fetched.parsed, Some(Node::string("vpc-123")));

        let fetched = importer
            .fetch(&location("cfn:resource:network/Vpc"))
            .await
            .unwrap();
        let parsed = fetched.parsed.unwrap();
        assert_eq!(
            parsed.as_map().unwrap()["PhysicalResourceId"],
            Node::string("vpc-123")
        );

        let fetched = importer
            .fetch(&location("cfn:stack:network"))
            .await
            .unwrap();
        let parsed = fetched.parsed.unwrap();
        assert_eq!(
            parsed.as_map().unwrap()["StackStatus"],
            Node::string("CREATE_COMPLETE")
        );

        let fetched = importer
            .fetch(&location("cfn:export:network-VpcId"))
            .await
            .unwrap();
        assert_eq!(fetched.raw, b"vpc-123");
    }

    #[tokio::test]
    async fn test_cfn_failures() {
        let importer = CfnImporter::new(Arc::new(Stacks));
        for (text, invalid) in [
            ("cfn:output:network/Missing", false),
            ("cfn:export:nothing", false),
            ("cfn:bogus:network/VpcId", true),
            ("cfn:output-network", true),
        ] {
            let err = importer.fetch(&location(text)).await.unwrap_err();
            if invalid {
                assert!(matches!(err, ImportFailure::InvalidLocation(_)), "{text}");
            } else {
                assert!(matches!(err, ImportFailure::NotFound(_)), "{text}");
            }
        }
    }
}
