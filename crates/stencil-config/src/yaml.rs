//! YAML text to document tree conversion, and rendering back to text.

use serde_yaml::Value;
use stencil_core::tag::{GroupBy, Intrinsic, Let, Loop, Tag};
use stencil_core::{Error, Mapping, Node, Result};

/// Output text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

/// Parse YAML (or JSON) text into a node tree, building tags as they appear.
pub fn parse_document(text: &str, location: &str) -> Result<Node> {
    let value: Value = serde_yaml::from_str(text).map_err(|e| Error::Parse {
        location: location.to_string(),
        message: e.to_string(),
    })?;
    from_yaml(value, "Root")
}

/// Parse JSON bytes into a plain node tree.
pub fn parse_json(raw: &[u8], location: &str) -> Result<Node> {
    let value: serde_json::Value = serde_json::from_slice(raw).map_err(|e| Error::Parse {
        location: location.to_string(),
        message: e.to_string(),
    })?;
    Ok(Node::from_json(&value))
}

/// Serialize a node tree.
pub fn render(node: &Node, format: OutputFormat) -> Result<String> {
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(&node.to_yaml()).map_err(|e| e.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(&node.to_json())
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| e.to_string()),
    };
    rendered.map_err(|message| Error::Parse {
        location: "<output>".to_string(),
        message,
    })
}

/// Convert a YAML value, building tags from tagged values. `path` prefixes error breadcrumbs.
pub fn from_yaml(value: Value, path: &str) -> Result<Node> {
    Ok(match value {
        Value::Null => Node::Null,
        Value::Bool(b) => Node::Bool(b),
        Value::Number(n) => Node::Number(n),
        Value::String(s) => Node::String(s),
        Value::Sequence(items) => Node::Seq(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| from_yaml(item, &format!("{path}.{i}")))
                .collect::<Result<_>>()?,
        ),
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, value) in map {
                let key = key_text(key, path)?;
                let child = format!("{path}.{key}");
                out.insert(key, from_yaml(value, &child)?);
            }
            Node::Map(out)
        }
        Value::Tagged(tagged) => {
            let name = tagged.tag.to_string();
            let name = name.trim_start_matches('!').to_string();
            let payload = from_yaml(tagged.value, path)?;
            Node::tag(build_tag(&name, payload, path)?)
        }
    })
}

fn key_text(key: Value, path: &str) -> Result<String> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(Error::malformed(
            "key",
            path,
            format!("map keys must be scalars, found {other:?}"),
        )),
    }
}

/// Build a tag from its name and converted payload, checking the payload shape.
pub fn build_tag(name: &str, payload: Node, path: &str) -> Result<Tag> {
    let bad = |message: String| Error::malformed(format!("!{name}"), path, message);

    Ok(match name {
        "$" | "$include" => match payload {
            Node::String(s) => Tag::Include(s.trim().to_string()),
            other => return Err(bad(format!("expected a lookup path, found {}", other.kind()))),
        },
        "$expand" => {
            let mut map = expect_map(payload).map_err(bad)?;
            if map.len() != 2 || !map.contains_key("template") || !map.contains_key("params") {
                return Err(bad(
                    "payload must have exactly the keys template and params".to_string(),
                ));
            }
            Tag::Expand {
                template: map.shift_remove("template").unwrap_or(Node::Null),
                params: map.shift_remove("params").unwrap_or(Node::Null),
            }
        }
        "$escape" => Tag::Escape(payload),
        "$string" => Tag::StringCoerce(payload),
        "$parseYaml" => Tag::ParseYaml(payload),
        "$if" => {
            let mut map = expect_map(payload).map_err(bad)?;
            let test = take(&mut map, "test").map_err(bad)?;
            let then = take(&mut map, "then").map_err(bad)?;
            Tag::If {
                test,
                then,
                otherwise: map.shift_remove("else"),
            }
        }
        "$eq" => {
            let [a, b] = expect_pair(payload).map_err(bad)?;
            Tag::Eq(a, b)
        }
        "$not" => Tag::Not(payload),
        "$let" => {
            let mut bindings = expect_map(payload).map_err(bad)?;
            let body = take(&mut bindings, Let::BODY_KEY).map_err(bad)?;
            Tag::Let(Let { bindings, body })
        }
        "$map" => Tag::Map(build_loop(payload, true).map_err(bad)?),
        "$mapValues" => Tag::MapValues(build_loop(payload, false).map_err(bad)?),
        "$concatMap" => Tag::ConcatMap(build_loop(payload, false).map_err(bad)?),
        "$mergeMap" => Tag::MergeMap(build_loop(payload, false).map_err(bad)?),
        "$mapListToHash" => Tag::MapListToHash(build_loop(payload, false).map_err(bad)?),
        "$groupBy" => {
            let mut map = expect_map(payload).map_err(bad)?;
            Tag::GroupBy(GroupBy {
                items: take(&mut map, "items").map_err(bad)?,
                key: take(&mut map, "key").map_err(bad)?,
                var: take_var(&mut map).map_err(bad)?,
                template: map.shift_remove("template"),
            })
        }
        "$concat" => Tag::Concat(payload),
        "$merge" => Tag::Merge(payload),
        "$fromPairs" => Tag::FromPairs(payload),
        "$split" => {
            let [delimiter, value] = expect_pair(payload).map_err(bad)?;
            Tag::Split { delimiter, value }
        }
        "Ref" => Tag::Ref(payload),
        "GetAtt" => Tag::GetAtt(payload),
        "Sub" => Tag::Sub(payload),
        other => match Intrinsic::from_tag_name(other) {
            Some(intrinsic) => Tag::Intrinsic(intrinsic, payload),
            None => return Err(bad("unknown tag".to_string())),
        },
    })
}

fn build_loop(payload: Node, allow_filter: bool) -> std::result::Result<Loop, String> {
    let mut map = expect_map(payload)?;
    let items = take(&mut map, "items")?;
    let template = take(&mut map, "template")?;
    let var = take_var(&mut map)?;
    let filter = map.shift_remove("filter");
    if filter.is_some() && !allow_filter {
        return Err("filter is only supported by !$map".to_string());
    }
    Ok(Loop {
        items,
        template,
        var,
        filter,
    })
}

fn expect_map(payload: Node) -> std::result::Result<Mapping, String> {
    match payload {
        Node::Map(map) => Ok(map),
        other => Err(format!("expected a map, found {}", other.kind())),
    }
}

fn expect_pair(payload: Node) -> std::result::Result<[Node; 2], String> {
    match payload {
        Node::Seq(items) => {
            let len = items.len();
            <[Node; 2]>::try_from(items)
                .map_err(|_| format!("expected a two-element sequence, found {len} elements"))
        }
        other => Err(format!("expected a two-element sequence, found {}", other.kind())),
    }
}

fn take(map: &mut Mapping, key: &str) -> std::result::Result<Node, String> {
    map.shift_remove(key)
        .ok_or_else(|| format!("missing required key {key}"))
}

fn take_var(map: &mut Mapping) -> std::result::Result<Option<String>, String> {
    match map.shift_remove("var") {
        None => Ok(None),
        Some(Node::String(s)) => Ok(Some(s)),
        Some(other) => Err(format!("var must be a string, found {}", other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Node> {
        parse_document(text, "test.yaml")
    }

    #[test]
    fn test_parse_plain_document() {
        let node = parse("a: 1\nb: [x, true]\n").unwrap();
        let map = node.as_map().unwrap();
        assert_eq!(map["a"], Node::int(1));
        assert_eq!(
            map["b"],
            Node::Seq(vec![Node::string("x"), Node::Bool(true)])
        );
    }

    #[test]
    fn test_parse_include_and_loop() {
        let node = parse("out: !$map\n  items: [1, 2]\n  template: !$ item\n").unwrap();
        let Node::Tag(tag) = &node.as_map().unwrap()["out"] else {
            panic!("expected a tag");
        };
        let Tag::Map(l) = tag.as_ref() else {
            panic!("expected !$map");
        };
        assert_eq!(l.var_name(), "item");
        assert_eq!(l.template, Node::tag(Tag::Include("item".into())));
    }

    #[test]
    fn test_parse_intrinsics() {
        let node = parse("a: !Ref Bucket\nb: !Join ['-', [x, y]]\n").unwrap();
        let map = node.as_map().unwrap();
        assert_eq!(map["a"], Node::tag(Tag::Ref(Node::string("Bucket"))));
        assert!(matches!(
            &map["b"],
            Node::Tag(t) if matches!(t.as_ref(), Tag::Intrinsic(Intrinsic::Join, _))
        ));
    }

    #[test]
    fn test_expand_requires_exact_keys() {
        let err = parse("x: !$expand {template: foo}\n").unwrap_err();
        assert!(matches!(err, Error::MalformedTag { .. }));

        let ok = parse("x: !$expand {template: foo, params: {a: 1}}\n");
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_tag_is_malformed() {
        let err = parse("x: !$nope 1\n").unwrap_err();
        match err {
            Error::MalformedTag { tag, path, .. } => {
                assert_eq!(tag, "!$nope");
                assert_eq!(path, "Root.x");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_filter_only_on_map() {
        let err = parse("x: !$concatMap {items: [], template: 1, filter: true}\n").unwrap_err();
        assert!(matches!(err, Error::MalformedTag { .. }));
    }

    #[test]
    fn test_parse_error_names_location() {
        let err = parse("a: [unclosed\n").unwrap_err();
        assert!(matches!(err, Error::Parse { location, .. } if location == "test.yaml"));
    }

    #[test]
    fn test_render_json() {
        let node = parse("a: 1\n").unwrap();
        let text = render(&node, OutputFormat::Json).unwrap();
        assert_eq!(text, "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn test_render_quotes_leading_zero_strings() {
        let node = Node::Map(Mapping::from([
            ("mode".to_string(), Node::string("0755")),
            ("day".to_string(), Node::string("08")),
            ("octal".to_string(), Node::string("010")),
        ]));
        let text = render(&node, OutputFormat::Yaml).unwrap();
        for quoted in ["'0755'", "'08'", "'010'"] {
            assert!(text.contains(quoted), "{quoted} not quoted in {text}");
        }
        assert_eq!(parse(&text).unwrap(), node);
    }
}
