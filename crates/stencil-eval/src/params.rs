//! Template parameter validation.

use regex::Regex;
use stencil_core::{Node, ParamSpec};

/// Primitive type names checked against the value's kind.
const PRIMITIVE_TYPES: [&str; 5] = ["string", "number", "boolean", "object", "array"];

/// Infrastructure parameter types accepted without a kind check.
const RESOURCE_ID_TYPES: [&str; 12] = [
    "AWS::EC2::AvailabilityZone::Name",
    "AWS::EC2::Image::Id",
    "AWS::EC2::Instance::Id",
    "AWS::EC2::KeyPair::KeyName",
    "AWS::EC2::SecurityGroup::GroupName",
    "AWS::EC2::SecurityGroup::Id",
    "AWS::EC2::Subnet::Id",
    "AWS::EC2::Volume::Id",
    "AWS::EC2::VPC::Id",
    "AWS::Route53::HostedZone::Id",
    "AWS::SSM::Parameter::Name",
    "AWS::SSM::Parameter::Value<String>",
];

/// Check one parameter's final value.
///
/// Only the first declared rule applies: schema, then allowed values, then
/// allowed pattern, then type. The error message is meant for users.
pub fn validate_param(param: &ParamSpec, value: Option<&Node>) -> Result<(), String> {
    let Some(value) = value else {
        return Err("missing value and no default".to_string());
    };

    if let Some(schema) = &param.schema {
        return check_schema(schema, value);
    }
    if let Some(allowed) = &param.allowed_values {
        if allowed.contains(value) {
            return Ok(());
        }
        let listed: Vec<String> = allowed.iter().map(Node::to_text).collect();
        return Err(format!(
            "{} is not one of [{}]",
            value.to_text(),
            listed.join(", ")
        ));
    }
    if let Some(pattern) = &param.allowed_pattern {
        let re = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| format!("invalid AllowedPattern {pattern}: {e}"))?;
        let text = value.to_text();
        if re.is_match(&text) {
            return Ok(());
        }
        return Err(format!("{text} does not match {pattern}"));
    }
    if let Some(ty) = &param.param_type {
        return check_type(ty, value);
    }
    Ok(())
}

fn check_schema(schema: &Node, value: &Node) -> Result<(), String> {
    let schema = schema.to_json();
    let validator =
        jsonschema::validator_for(&schema).map_err(|e| format!("invalid Schema: {e}"))?;
    let instance = value.to_json();
    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("schema validation failed: {}", errors.join("; ")))
    }
}

fn check_type(ty: &str, value: &Node) -> Result<(), String> {
    let mismatch = || format!("expected {ty}, found {}", value.kind());

    if PRIMITIVE_TYPES.contains(&ty) {
        let ok = match ty {
            "string" => matches!(value, Node::String(_)),
            "number" => matches!(value, Node::Number(_)),
            "boolean" => matches!(value, Node::Bool(_)),
            "object" => matches!(value, Node::Map(_)),
            _ => matches!(value, Node::Seq(_)),
        };
        return if ok { Ok(()) } else { Err(mismatch()) };
    }

    match ty {
        "String" => {
            if value.is_scalar() {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        "Number" => match value {
            Node::Number(_) => Ok(()),
            Node::String(s) if s.trim().parse::<f64>().is_ok() => Ok(()),
            _ => Err(mismatch()),
        },
        "CommaDelimitedList" | "List<Number>" => list_like(value).then_some(()).ok_or_else(mismatch),
        _ if is_resource_id_type(ty) => Ok(()),
        _ => match ty.strip_prefix("List<").and_then(|t| t.strip_suffix('>')) {
            Some(inner) if is_resource_id_type(inner) => {
                list_like(value).then_some(()).ok_or_else(mismatch)
            }
            _ => Err(format!("unknown parameter type {ty}")),
        },
    }
}

fn is_resource_id_type(ty: &str) -> bool {
    RESOURCE_ID_TYPES.contains(&ty)
        || (ty.starts_with("AWS::SSM::Parameter::Value<") && ty.ends_with('>'))
}

fn list_like(value: &Node) -> bool {
    matches!(value, Node::Seq(_) | Node::String(_))
}
