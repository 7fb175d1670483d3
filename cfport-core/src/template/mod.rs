//! Template - Source template object model
//!
//! A parsed CloudFormation template: parameters, mappings and resources, with
//! intrinsic function nodes kept as an AST inside resource property trees.

pub mod evaluate;
pub mod intrinsic;
pub mod loader;

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

pub use evaluate::{EvaluationContext, TemplateError, TemplateResult};
pub use intrinsic::{Intrinsic, IntrinsicKind, SubSegment, parse_sub};

/// Node of a resource property tree
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<TemplateValue>),
    Map(IndexMap<String, TemplateValue>),
    Intrinsic(Box<Intrinsic>),
}

impl TemplateValue {
    pub fn string(s: impl Into<String>) -> Self {
        TemplateValue::String(s.into())
    }

    pub fn intrinsic(intrinsic: Intrinsic) -> Self {
        TemplateValue::Intrinsic(Box::new(intrinsic))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TemplateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_intrinsic(&self) -> Option<&Intrinsic> {
        match self {
            TemplateValue::Intrinsic(i) => Some(i),
            _ => None,
        }
    }

    /// Literal form of an intrinsic-free scalar or list
    pub fn to_literal(&self) -> Option<Literal> {
        match self {
            TemplateValue::Null => Some(Literal::Null),
            TemplateValue::Bool(b) => Some(Literal::Bool(*b)),
            TemplateValue::Int(i) => Some(Literal::Number(*i as f64)),
            TemplateValue::Float(f) => Some(Literal::Number(*f)),
            TemplateValue::String(s) => Some(Literal::String(s.clone())),
            TemplateValue::List(items) => items
                .iter()
                .map(|v| v.to_literal())
                .collect::<Option<Vec<_>>>()
                .map(Literal::List),
            TemplateValue::Map(_) | TemplateValue::Intrinsic(_) => None,
        }
    }
}

/// Result of evaluating an intrinsic against the deployed stack
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Literal>),
}

impl Literal {
    pub fn string(s: impl Into<String>) -> Self {
        Literal::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Literal::Number(n) => Some(*n),
            Literal::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) => Some(items),
            _ => None,
        }
    }

    /// Text spliced into a string by `Fn::Join` and `Fn::Sub`
    ///
    /// Lists and null have no string form.
    pub fn to_interpolated(&self) -> Option<String> {
        match self {
            Literal::String(s) => Some(s.clone()),
            Literal::Number(n) => Some(format_number(*n)),
            Literal::Bool(b) => Some(b.to_string()),
            Literal::Null | Literal::List(_) => None,
        }
    }

    /// Convert a JSON scalar or array of scalars
    pub fn from_json(value: &Value) -> Option<Literal> {
        match value {
            Value::Null => Some(Literal::Null),
            Value::Bool(b) => Some(Literal::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Literal::Number),
            Value::String(s) => Some(Literal::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Literal::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Literal::List),
            Value::Object(_) => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Number(n) => write!(f, "{}", format_number(*n)),
            Literal::String(s) => write!(f, "{}", s),
            Literal::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Canonical text of a number: integral values print without a fraction
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Template parameter declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub parameter_type: String,
    pub default: Option<Literal>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, parameter_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_type: parameter_type.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Literal) -> Self {
        self.default = Some(default);
        self
    }

    /// `AWS::SSM::Parameter::Value<...>` parameters are resolved from Parameter Store
    pub fn is_ssm_parameter(&self) -> bool {
        self.parameter_type.starts_with("AWS::SSM::Parameter::Value<")
    }

    pub fn is_list(&self) -> bool {
        self.parameter_type == "CommaDelimitedList"
            || self.parameter_type.starts_with("List<")
            || self.parameter_type.starts_with("AWS::SSM::Parameter::Value<List<")
            || self.parameter_type == "AWS::SSM::Parameter::Value<CommaDelimitedList>"
    }
}

/// Resource declared in the template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateResource {
    pub name: String,
    pub resource_type: String,
    pub properties: IndexMap<String, TemplateValue>,
    pub condition: Option<String>,
}

impl TemplateResource {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            properties: IndexMap::new(),
            condition: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: TemplateValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Two-level lookup tables used by `Fn::FindInMap`
pub type Mapping = IndexMap<String, IndexMap<String, Literal>>;

/// Parsed template
///
/// `conditions` holds the outcome each condition had when the stack was
/// deployed; the expressions themselves are not evaluated here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub parameters: Vec<Parameter>,
    pub mappings: IndexMap<String, Mapping>,
    pub conditions: HashMap<String, bool>,
    pub resources: Vec<TemplateResource>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_resource(mut self, resource: TemplateResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_mapping(mut self, name: impl Into<String>, mapping: Mapping) -> Self {
        self.mappings.insert(name.into(), mapping);
        self
    }

    pub fn with_condition(mut self, name: impl Into<String>, value: bool) -> Self {
        self.conditions.insert(name.into(), value);
        self
    }

    pub fn resource(&self, name: &str) -> Option<&TemplateResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn condition(&self, name: &str) -> Option<bool> {
        self.conditions.get(name).copied()
    }

    pub fn find_in_map(&self, map_name: &str, top_key: &str, second_key: &str) -> Option<&Literal> {
        self.mappings.get(map_name)?.get(top_key)?.get(second_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.25), "0.25");
    }

    #[test]
    fn test_interpolated_forms() {
        assert_eq!(Literal::Number(8080.0).to_interpolated().as_deref(), Some("8080"));
        assert_eq!(Literal::Bool(true).to_interpolated().as_deref(), Some("true"));
        assert_eq!(Literal::List(vec![]).to_interpolated(), None);
    }

    #[test]
    fn test_literal_from_json() {
        assert_eq!(
            Literal::from_json(&json!(["a", 1])),
            Some(Literal::List(vec![Literal::string("a"), Literal::Number(1.0)]))
        );
        assert_eq!(Literal::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_parameter_kinds() {
        assert!(Parameter::new("AmiId", "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>").is_ssm_parameter());
        assert!(Parameter::new("Subnets", "List<AWS::EC2::Subnet::Id>").is_list());
        assert!(Parameter::new("Names", "CommaDelimitedList").is_list());
        assert!(!Parameter::new("Env", "String").is_list());
    }

    #[test]
    fn test_find_in_map() {
        let mut regions = IndexMap::new();
        regions.insert("ami".to_string(), Literal::string("ami-123"));
        let mut mapping = Mapping::new();
        mapping.insert("eu-west-1".to_string(), regions);
        let template = Template::new().with_mapping("RegionMap", mapping);

        assert_eq!(
            template.find_in_map("RegionMap", "eu-west-1", "ami"),
            Some(&Literal::string("ami-123"))
        );
        assert_eq!(template.find_in_map("RegionMap", "us-east-1", "ami"), None);
    }
}
