//! Reference - Symbolic expressions that replace literal state values
//!
//! A [`Reference`] is written into a state attribute tree as a tagged string
//! token so it survives being stored as JSON; the configuration writer later
//! decodes the token and renders the expression.
//!
//! Token format: `<Tag>:<address>` or `<Tag>:<address>:<index>`. Function
//! references use `name(<JSON argument list>)` as their address.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};
use thiserror::Error;

use crate::template::format_number;

#[derive(Debug, Error, PartialEq)]
pub enum ReferenceError {
    #[error("Not a reference token: '{0}'")]
    NotAToken(String),

    #[error("Unknown reference type '{0}'")]
    UnknownTag(String),

    #[error("Malformed {tag} token: {message}")]
    Malformed { tag: &'static str, message: String },
}

/// Function call expression, e.g. `join(",", [aws_s3_bucket.A.id, "x"])`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionReference {
    pub name: String,
    pub arguments: Vec<FunctionArgument>,
    pub index: Option<usize>,
}

impl FunctionReference {
    pub fn new(name: impl Into<String>, arguments: Vec<FunctionArgument>) -> Self {
        Self {
            name: name.into(),
            arguments,
            index: None,
        }
    }

    pub fn with_index(mut self, index: Option<usize>) -> Self {
        self.index = index;
        self
    }

    /// `join` over `items` with `separator`
    pub fn join(separator: impl Into<String>, items: Vec<FunctionArgument>) -> Self {
        Self::new(
            "join",
            vec![
                FunctionArgument::String(separator.into()),
                FunctionArgument::List(items),
            ],
        )
    }

    fn expression(&self) -> String {
        let args: Vec<String> = self.arguments.iter().map(FunctionArgument::expression).collect();
        let mut out = format!("{}({})", self.name, args.join(", "));
        if let Some(i) = self.index {
            out.push_str(&format!("[{}]", i));
        }
        out
    }

    fn encoded_address(&self) -> String {
        let args = Value::Array(self.arguments.iter().map(FunctionArgument::to_json).collect());
        format!("{}({})", self.name, args)
    }

    fn decode(tag: &'static str, rest: &str) -> Result<Self, ReferenceError> {
        let malformed = |message: &str| ReferenceError::Malformed {
            tag,
            message: message.to_string(),
        };
        let open = rest.find('(').ok_or_else(|| malformed("missing '('"))?;
        let close = rest.rfind(')').ok_or_else(|| malformed("missing ')'"))?;
        if close < open {
            return Err(malformed("unbalanced parentheses"));
        }
        let name = &rest[..open];
        let args: Value =
            serde_json::from_str(&rest[open + 1..close]).map_err(|e| malformed(&e.to_string()))?;
        let arguments = args
            .as_array()
            .ok_or_else(|| malformed("arguments must be a list"))?
            .iter()
            .map(FunctionArgument::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        let index = match &rest[close + 1..] {
            "" => None,
            suffix => Some(parse_index(tag, suffix.strip_prefix(':').unwrap_or(suffix))?),
        };
        Ok(Self {
            name: name.to_string(),
            arguments,
            index,
        })
    }
}

/// Argument of a [`FunctionReference`]
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArgument {
    String(String),
    Number(f64),
    Bool(bool),
    Reference(Box<Reference>),
    List(Vec<FunctionArgument>),
}

impl FunctionArgument {
    pub fn reference(reference: Reference) -> Self {
        FunctionArgument::Reference(Box::new(reference))
    }

    /// Whether a reference appears anywhere in this argument
    pub fn has_reference(&self) -> bool {
        match self {
            FunctionArgument::Reference(_) => true,
            FunctionArgument::List(items) => items.iter().any(FunctionArgument::has_reference),
            _ => false,
        }
    }

    fn expression(&self) -> String {
        match self {
            FunctionArgument::String(s) => quote(s),
            FunctionArgument::Number(n) => format_number(*n),
            FunctionArgument::Bool(b) => b.to_string(),
            FunctionArgument::Reference(r) => r.expression(),
            // A single reference renders bare rather than as a one-element list
            FunctionArgument::List(items) => match items.as_slice() {
                [FunctionArgument::Reference(r)] => r.expression(),
                _ => {
                    let parts: Vec<String> = items.iter().map(FunctionArgument::expression).collect();
                    format!("[{}]", parts.join(", "))
                }
            },
        }
    }

    fn to_json(&self) -> Value {
        match self {
            FunctionArgument::String(s) => Value::String(s.clone()),
            FunctionArgument::Number(n) => json!(n),
            FunctionArgument::Bool(b) => Value::Bool(*b),
            FunctionArgument::Reference(r) => json!({ "ref": r.encode() }),
            FunctionArgument::List(items) => {
                Value::Array(items.iter().map(FunctionArgument::to_json).collect())
            }
        }
    }

    fn from_json(value: &Value) -> Result<Self, ReferenceError> {
        let malformed = |message: String| ReferenceError::Malformed {
            tag: FUNCTION_TAG,
            message,
        };
        match value {
            Value::String(s) => Ok(FunctionArgument::String(s.clone())),
            Value::Bool(b) => Ok(FunctionArgument::Bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(FunctionArgument::Number)
                .ok_or_else(|| malformed(format!("bad number {}", n))),
            Value::Array(items) => items
                .iter()
                .map(FunctionArgument::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(FunctionArgument::List),
            Value::Object(map) => match map.get("ref").and_then(Value::as_str) {
                Some(token) => Ok(FunctionArgument::reference(Reference::decode(token)?)),
                None => Err(malformed("argument object without 'ref'".to_string())),
            },
            Value::Null => Err(malformed("null argument".to_string())),
        }
    }
}

/// Quote a string literal for configuration text, escaping interpolation markers
fn quote(s: &str) -> String {
    let escaped = Value::String(s.to_string()).to_string();
    escaped.replace("${", "$${").replace("%{", "%%{")
}

const DIRECT_TAG: &str = "DirectReference";
const INDIRECT_TAG: &str = "IndirectReference";
const PARAMETER_TAG: &str = "ParameterReference";
const MODULE_TAG: &str = "ModuleReference";
const DATA_SOURCE_TAG: &str = "DataSourceReference";
const MAP_TAG: &str = "MapReference";
const FUNCTION_TAG: &str = "FunctionReference";
const JOIN_FUNCTION_TAG: &str = "JoinFunctionReference";

/// Symbolic expression replacing a literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// Resource identity; renders `address.id`
    Direct { address: String },
    /// Full attribute path; renders verbatim
    Indirect { address: String },
    /// Input variable, optionally indexed
    Parameter { address: String, index: Option<usize> },
    /// Module output; renders `module.address`
    Module { address: String, index: Option<usize> },
    /// Data source attribute path
    DataSource { address: String },
    /// Entry of the `local.mappings` object
    Map { address: String, index: Option<usize> },
    Function(FunctionReference),
    /// `join(separator, [items])` built from `Fn::Join` or `Fn::Sub`
    JoinFunction(FunctionReference),
}

impl Reference {
    pub fn direct(address: impl Into<String>) -> Self {
        Reference::Direct {
            address: address.into(),
        }
    }

    pub fn indirect(address: impl Into<String>) -> Self {
        Reference::Indirect {
            address: address.into(),
        }
    }

    pub fn parameter(address: impl Into<String>, index: Option<usize>) -> Self {
        Reference::Parameter {
            address: address.into(),
            index,
        }
    }

    pub fn data_source(address: impl Into<String>) -> Self {
        Reference::DataSource {
            address: address.into(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Reference::Direct { .. } => DIRECT_TAG,
            Reference::Indirect { .. } => INDIRECT_TAG,
            Reference::Parameter { .. } => PARAMETER_TAG,
            Reference::Module { .. } => MODULE_TAG,
            Reference::DataSource { .. } => DATA_SOURCE_TAG,
            Reference::Map { .. } => MAP_TAG,
            Reference::Function(_) => FUNCTION_TAG,
            Reference::JoinFunction(_) => JOIN_FUNCTION_TAG,
        }
    }

    /// Configuration expression text
    pub fn expression(&self) -> String {
        let indexed = |base: String, index: &Option<usize>| match index {
            Some(i) => format!("{}[{}]", base, i),
            None => base,
        };
        match self {
            Reference::Direct { address } => format!("{}.id", address),
            Reference::Indirect { address } | Reference::DataSource { address } => address.clone(),
            Reference::Parameter { address, index } => indexed(address.clone(), index),
            Reference::Module { address, index } => indexed(format!("module.{}", address), index),
            Reference::Map { address, index } => indexed(format!("local.mappings{}", address), index),
            Reference::Function(f) | Reference::JoinFunction(f) => f.expression(),
        }
    }

    /// Every data source address this reference reads, including nested ones
    pub fn data_source_addresses(&self) -> Vec<&str> {
        fn collect<'r>(argument: &'r FunctionArgument, out: &mut Vec<&'r str>) {
            match argument {
                FunctionArgument::Reference(r) => out.extend(r.data_source_addresses()),
                FunctionArgument::List(items) => items.iter().for_each(|i| collect(i, out)),
                _ => {}
            }
        }
        match self {
            Reference::DataSource { address } => vec![address.as_str()],
            Reference::Function(f) | Reference::JoinFunction(f) => {
                let mut out = Vec::new();
                f.arguments.iter().for_each(|a| collect(a, &mut out));
                out
            }
            _ => vec![],
        }
    }

    /// Tagged string token stored in the state tree
    pub fn encode(&self) -> String {
        let (address, index) = match self {
            Reference::Direct { address }
            | Reference::Indirect { address }
            | Reference::DataSource { address } => (address.clone(), None),
            Reference::Parameter { address, index }
            | Reference::Module { address, index }
            | Reference::Map { address, index } => (address.clone(), *index),
            Reference::Function(f) | Reference::JoinFunction(f) => (f.encoded_address(), f.index),
        };
        match index {
            Some(i) => format!("{}:{}:{}", self.tag(), address, i),
            None => format!("{}:{}", self.tag(), address),
        }
    }

    pub fn decode(token: &str) -> Result<Self, ReferenceError> {
        let (tag, rest) = token
            .split_once(':')
            .ok_or_else(|| ReferenceError::NotAToken(token.to_string()))?;
        match tag {
            DIRECT_TAG => Ok(Reference::direct(rest)),
            INDIRECT_TAG => Ok(Reference::indirect(rest)),
            DATA_SOURCE_TAG => Ok(Reference::data_source(rest)),
            PARAMETER_TAG => {
                let (address, index) = split_index(PARAMETER_TAG, rest)?;
                Ok(Reference::Parameter { address, index })
            }
            MODULE_TAG => {
                let (address, index) = split_index(MODULE_TAG, rest)?;
                Ok(Reference::Module { address, index })
            }
            MAP_TAG => {
                let (address, index) = split_index(MAP_TAG, rest)?;
                Ok(Reference::Map { address, index })
            }
            FUNCTION_TAG => FunctionReference::decode(FUNCTION_TAG, rest).map(Reference::Function),
            JOIN_FUNCTION_TAG => {
                FunctionReference::decode(JOIN_FUNCTION_TAG, rest).map(Reference::JoinFunction)
            }
            other => Err(ReferenceError::UnknownTag(other.to_string())),
        }
    }

    /// Decode a state leaf if it holds a reference token
    pub fn from_leaf(value: &str) -> Option<Self> {
        Reference::decode(value).ok()
    }
}

fn parse_index(tag: &'static str, text: &str) -> Result<usize, ReferenceError> {
    text.parse().map_err(|_| ReferenceError::Malformed {
        tag,
        message: format!("'{}' is not an index", text),
    })
}

/// Split a trailing `:<digits>` index from an address
fn split_index(tag: &'static str, rest: &str) -> Result<(String, Option<usize>), ReferenceError> {
    match rest.rsplit_once(':') {
        Some((address, suffix)) if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) => {
            Ok((address.to_string(), Some(parse_index(tag, suffix)?)))
        }
        _ => Ok((rest.to_string(), None)),
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression())
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Reference::decode(&token).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<Reference> {
        let nested = Reference::direct("aws_s3_bucket.A");
        vec![
            Reference::direct("aws_s3_bucket.MyBucket"),
            Reference::indirect("aws_iam_role.Role.arn"),
            Reference::parameter("var.Env", None),
            Reference::parameter("var.Subnets", Some(1)),
            Reference::Module {
                address: "Network.VpcId".to_string(),
                index: Some(0),
            },
            Reference::data_source("data.aws_region.current.name"),
            Reference::Map {
                address: ".RegionMap[data.aws_region.current.name].ami".to_string(),
                index: None,
            },
            Reference::Function(
                FunctionReference::new(
                    "cidrsubnets",
                    vec![
                        FunctionArgument::String("10.0.0.0/16".to_string()),
                        FunctionArgument::Number(8.0),
                        FunctionArgument::Number(8.0),
                    ],
                )
                .with_index(Some(1)),
            ),
            Reference::JoinFunction(FunctionReference::join(
                ":",
                vec![
                    FunctionArgument::reference(nested),
                    FunctionArgument::String("a:b)".to_string()),
                    FunctionArgument::Bool(true),
                ],
            )),
        ]
    }

    #[test]
    fn test_token_round_trip() {
        for reference in all_variants() {
            let token = reference.encode();
            assert_eq!(Reference::decode(&token), Ok(reference.clone()), "token {}", token);
        }
    }

    #[test]
    fn test_round_trip_through_json_document() {
        let references = all_variants();
        let text = serde_json::to_string(&references).unwrap();
        let decoded: Vec<Reference> = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, references);
    }

    #[test]
    fn test_token_format() {
        assert_eq!(
            Reference::direct("aws_s3_bucket.MyBucket").encode(),
            "DirectReference:aws_s3_bucket.MyBucket"
        );
        assert_eq!(
            Reference::parameter("var.Subnets", Some(2)).encode(),
            "ParameterReference:var.Subnets:2"
        );
    }

    #[test]
    fn test_expressions() {
        assert_eq!(Reference::direct("aws_s3_bucket.B").expression(), "aws_s3_bucket.B.id");
        assert_eq!(Reference::parameter("var.Subnets", Some(0)).expression(), "var.Subnets[0]");
        assert_eq!(
            Reference::Module {
                address: "Net.VpcId".to_string(),
                index: None
            }
            .expression(),
            "module.Net.VpcId"
        );
        assert_eq!(
            Reference::Map {
                address: ".RegionMap.eu.ami".to_string(),
                index: Some(1)
            }
            .expression(),
            "local.mappings.RegionMap.eu.ami[1]"
        );
    }

    #[test]
    fn test_join_expression_quotes_literals_only() {
        let join = Reference::JoinFunction(FunctionReference::join(
            ",",
            vec![
                FunctionArgument::reference(Reference::direct("aws_s3_bucket.A")),
                FunctionArgument::String("-literal-".to_string()),
                FunctionArgument::reference(Reference::indirect("aws_iam_role.B.arn")),
            ],
        ));
        assert_eq!(
            join.expression(),
            r#"join(",", [aws_s3_bucket.A.id, "-literal-", aws_iam_role.B.arn])"#
        );
    }

    #[test]
    fn test_single_reference_list_renders_bare() {
        let join = Reference::JoinFunction(FunctionReference::join(
            "",
            vec![FunctionArgument::reference(Reference::direct("aws_s3_bucket.A"))],
        ));
        assert_eq!(join.expression(), r#"join("", aws_s3_bucket.A.id)"#);
    }

    #[test]
    fn test_literal_interpolation_is_escaped() {
        let f = Reference::Function(FunctionReference::new(
            "base64encode",
            vec![FunctionArgument::String("echo ${HOME}".to_string())],
        ));
        assert_eq!(f.expression(), r#"base64encode("echo $${HOME}")"#);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Reference::decode("plain-value"),
            Err(ReferenceError::NotAToken(_))
        ));
        assert!(matches!(
            Reference::decode("arn:aws:s3:::bucket"),
            Err(ReferenceError::UnknownTag(_))
        ));
        assert!(matches!(
            Reference::decode("FunctionReference:split"),
            Err(ReferenceError::Malformed { .. })
        ));
    }

    #[test]
    fn test_data_source_addresses() {
        let join = Reference::JoinFunction(FunctionReference::join(
            "",
            vec![
                FunctionArgument::String("arn:".to_string()),
                FunctionArgument::reference(Reference::data_source("data.aws_partition.partition.partition")),
            ],
        ));
        assert_eq!(join.data_source_addresses(), vec!["data.aws_partition.partition.partition"]);
    }
}
