//! Macro-language tags.
//!
//! Every construct of the template language is one variant of [`Tag`]. Tags are
//! built from YAML text by `stencil-config` and consumed by the evaluator with an
//! exhaustive match.

use crate::node::{Mapping, Node};

/// Loop construct shared by `!$map`, `!$mapValues`, `!$concatMap`, `!$mergeMap`
/// and `!$mapListToHash`.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub items: Node,
    pub template: Node,
    /// Loop variable name, `item` when absent.
    pub var: Option<String>,
    /// Element filter; only honoured by `!$map`.
    pub filter: Option<Node>,
}

impl Loop {
    pub const DEFAULT_VAR: &'static str = "item";

    pub fn var_name(&self) -> &str {
        self.var.as_deref().unwrap_or(Self::DEFAULT_VAR)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub items: Node,
    pub key: Node,
    pub var: Option<String>,
    pub template: Option<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Let {
    pub bindings: Mapping,
    pub body: Node,
}

impl Let {
    /// Key holding the continuation expression.
    pub const BODY_KEY: &'static str = "in";
}

/// Infrastructure intrinsic functions that are evaluated structurally and
/// emitted in their long form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Base64,
    Cidr,
    FindInMap,
    GetAZs,
    ImportValue,
    Join,
    Select,
    Split,
    Transform,
    And,
    Equals,
    If,
    Not,
    Or,
    Condition,
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 15] = [
        Intrinsic::Base64,
        Intrinsic::Cidr,
        Intrinsic::FindInMap,
        Intrinsic::GetAZs,
        Intrinsic::ImportValue,
        Intrinsic::Join,
        Intrinsic::Select,
        Intrinsic::Split,
        Intrinsic::Transform,
        Intrinsic::And,
        Intrinsic::Equals,
        Intrinsic::If,
        Intrinsic::Not,
        Intrinsic::Or,
        Intrinsic::Condition,
    ];

    /// Short tag name, as written after `!`.
    pub fn tag_name(self) -> &'static str {
        match self {
            Intrinsic::Base64 => "Base64",
            Intrinsic::Cidr => "Cidr",
            Intrinsic::FindInMap => "FindInMap",
            Intrinsic::GetAZs => "GetAZs",
            Intrinsic::ImportValue => "ImportValue",
            Intrinsic::Join => "Join",
            Intrinsic::Select => "Select",
            Intrinsic::Split => "Split",
            Intrinsic::Transform => "Transform",
            Intrinsic::And => "And",
            Intrinsic::Equals => "Equals",
            Intrinsic::If => "If",
            Intrinsic::Not => "Not",
            Intrinsic::Or => "Or",
            Intrinsic::Condition => "Condition",
        }
    }

    /// Key used by the long map form, e.g. `Fn::Join`.
    pub fn long_name(self) -> String {
        match self {
            Intrinsic::Condition => "Condition".to_string(),
            other => format!("Fn::{}", other.tag_name()),
        }
    }

    pub fn from_tag_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.tag_name() == name)
    }
}

/// A macro-language construct with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    /// `!$ a.b[c]` dotted lookup.
    Include(String),
    /// `!$expand {template, params}`.
    Expand { template: Node, params: Node },
    Escape(Node),
    StringCoerce(Node),
    ParseYaml(Node),
    If {
        test: Node,
        then: Node,
        otherwise: Option<Node>,
    },
    Eq(Node, Node),
    Not(Node),
    Let(Let),
    Map(Loop),
    MapValues(Loop),
    ConcatMap(Loop),
    MergeMap(Loop),
    MapListToHash(Loop),
    GroupBy(GroupBy),
    Concat(Node),
    Merge(Node),
    FromPairs(Node),
    Split { delimiter: Node, value: Node },
    Ref(Node),
    GetAtt(Node),
    Sub(Node),
    Intrinsic(Intrinsic, Node),
}

impl Tag {
    /// Tag name as written in YAML, without the leading `!`.
    pub fn name(&self) -> &'static str {
        match self {
            Tag::Include(_) => "$",
            Tag::Expand { .. } => "$expand",
            Tag::Escape(_) => "$escape",
            Tag::StringCoerce(_) => "$string",
            Tag::ParseYaml(_) => "$parseYaml",
            Tag::If { .. } => "$if",
            Tag::Eq(..) => "$eq",
            Tag::Not(_) => "$not",
            Tag::Let(_) => "$let",
            Tag::Map(_) => "$map",
            Tag::MapValues(_) => "$mapValues",
            Tag::ConcatMap(_) => "$concatMap",
            Tag::MergeMap(_) => "$mergeMap",
            Tag::MapListToHash(_) => "$mapListToHash",
            Tag::GroupBy(_) => "$groupBy",
            Tag::Concat(_) => "$concat",
            Tag::Merge(_) => "$merge",
            Tag::FromPairs(_) => "$fromPairs",
            Tag::Split { .. } => "$split",
            Tag::Ref(_) => "Ref",
            Tag::GetAtt(_) => "GetAtt",
            Tag::Sub(_) => "Sub",
            Tag::Intrinsic(i, _) => i.tag_name(),
        }
    }

    /// Rebuild the payload as it would be written in YAML.
    pub fn payload(&self) -> Node {
        match self {
            Tag::Include(path) => Node::String(path.clone()),
            Tag::Expand { template, params } => pairs([
                ("template", Some(template.clone())),
                ("params", Some(params.clone())),
            ]),
            Tag::Escape(n)
            | Tag::StringCoerce(n)
            | Tag::ParseYaml(n)
            | Tag::Not(n)
            | Tag::Concat(n)
            | Tag::Merge(n)
            | Tag::FromPairs(n)
            | Tag::Ref(n)
            | Tag::GetAtt(n)
            | Tag::Sub(n)
            | Tag::Intrinsic(_, n) => n.clone(),
            Tag::If {
                test,
                then,
                otherwise,
            } => pairs([
                ("test", Some(test.clone())),
                ("then", Some(then.clone())),
                ("else", otherwise.clone()),
            ]),
            Tag::Eq(a, b) => Node::Seq(vec![a.clone(), b.clone()]),
            Tag::Let(l) => {
                let mut map = l.bindings.clone();
                map.insert(Let::BODY_KEY.to_string(), l.body.clone());
                Node::Map(map)
            }
            Tag::Map(l)
            | Tag::MapValues(l)
            | Tag::ConcatMap(l)
            | Tag::MergeMap(l)
            | Tag::MapListToHash(l) => pairs([
                ("items", Some(l.items.clone())),
                ("template", Some(l.template.clone())),
                ("var", l.var.clone().map(Node::String)),
                ("filter", l.filter.clone()),
            ]),
            Tag::GroupBy(g) => pairs([
                ("items", Some(g.items.clone())),
                ("key", Some(g.key.clone())),
                ("var", g.var.clone().map(Node::String)),
                ("template", g.template.clone()),
            ]),
            Tag::Split { delimiter, value } => Node::Seq(vec![delimiter.clone(), value.clone()]),
        }
    }
}

fn pairs<const N: usize>(entries: [(&str, Option<Node>); N]) -> Node {
    Node::Map(
        entries
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .collect(),
    )
}
