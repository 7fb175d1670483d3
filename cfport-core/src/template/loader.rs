//! Loader - Build a [`Template`] from JSON or YAML template text
//!
//! Both the long form (`{"Fn::GetAtt": [...]}`) and the YAML short form
//! (`!GetAtt Resource.Attribute`) of intrinsic functions are accepted.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::evaluate::{TemplateError, TemplateResult};
use super::intrinsic::Intrinsic;
use super::{Literal, Mapping, Parameter, Template, TemplateResource, TemplateValue};

impl Template {
    pub fn from_json_str(text: &str) -> TemplateResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    pub fn from_yaml_str(text: &str) -> TemplateResult<Self> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
        Self::from_json(&yaml_to_json(yaml)?)
    }

    /// Parse template text, choosing the format from its first character
    pub fn from_str_auto(text: &str) -> TemplateResult<Self> {
        if text.trim_start().starts_with('{') {
            Self::from_json_str(text)
        } else {
            Self::from_yaml_str(text)
        }
    }

    pub fn from_json(document: &Value) -> TemplateResult<Self> {
        let root = document
            .as_object()
            .ok_or_else(|| TemplateError::Invalid("template root must be an object".to_string()))?;

        let mut template = Template::new();

        if let Some(parameters) = root.get("Parameters").and_then(Value::as_object) {
            for (name, decl) in parameters {
                let parameter_type = decl
                    .get("Type")
                    .and_then(Value::as_str)
                    .unwrap_or("String");
                let mut parameter = Parameter::new(name, parameter_type);
                if let Some(default) = decl.get("Default").and_then(Literal::from_json) {
                    parameter = parameter.with_default(default);
                }
                template.parameters.push(parameter);
            }
        }

        if let Some(mappings) = root.get("Mappings").and_then(Value::as_object) {
            for (name, body) in mappings {
                template.mappings.insert(name.clone(), parse_mapping(name, body)?);
            }
        }

        let resources = root
            .get("Resources")
            .and_then(Value::as_object)
            .ok_or_else(|| TemplateError::Invalid("template has no Resources section".to_string()))?;

        for (name, decl) in resources {
            let resource_type = decl.get("Type").and_then(Value::as_str).ok_or_else(|| {
                TemplateError::Invalid(format!("resource '{}' has no Type", name))
            })?;
            let mut resource = TemplateResource::new(name, resource_type);
            resource.condition = decl
                .get("Condition")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(properties) = decl.get("Properties").and_then(Value::as_object) {
                for (key, value) in properties {
                    resource.properties.insert(key.clone(), parse_value(value)?);
                }
            }
            template.resources.push(resource);
        }

        Ok(template)
    }
}

fn parse_mapping(name: &str, body: &Value) -> TemplateResult<Mapping> {
    let invalid = || TemplateError::Invalid(format!("mapping '{}' must be a two-level object", name));
    let mut mapping = Mapping::new();
    for (top_key, second) in body.as_object().ok_or_else(invalid)? {
        let mut entries = IndexMap::new();
        for (second_key, value) in second.as_object().ok_or_else(invalid)? {
            entries.insert(second_key.clone(), Literal::from_json(value).ok_or_else(invalid)?);
        }
        mapping.insert(top_key.clone(), entries);
    }
    Ok(mapping)
}

/// Convert a JSON property value, recognising intrinsic function objects
pub fn parse_value(value: &Value) -> TemplateResult<TemplateValue> {
    Ok(match value {
        Value::Null => TemplateValue::Null,
        Value::Bool(b) => TemplateValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => TemplateValue::Int(i),
            None => TemplateValue::Float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => TemplateValue::String(s.clone()),
        Value::Array(items) => {
            TemplateValue::List(items.iter().map(parse_value).collect::<TemplateResult<_>>()?)
        }
        Value::Object(map) => {
            if map.len() == 1
                && let Some((key, arg)) = map.iter().next()
                && let Some(intrinsic) = parse_intrinsic(key, arg)?
            {
                return Ok(TemplateValue::intrinsic(intrinsic));
            }
            let mut out = IndexMap::new();
            for (k, v) in map {
                out.insert(k.clone(), parse_value(v)?);
            }
            TemplateValue::Map(out)
        }
    })
}

fn args<'v>(name: &str, arg: &'v Value, count: usize) -> TemplateResult<&'v [Value]> {
    match arg.as_array() {
        Some(items) if items.len() == count => Ok(items),
        _ => Err(TemplateError::Invalid(format!(
            "{} expects a list of {} arguments",
            name, count
        ))),
    }
}

fn string_arg(name: &str, arg: &Value) -> TemplateResult<String> {
    arg.as_str()
        .map(str::to_string)
        .ok_or_else(|| TemplateError::Invalid(format!("{} expects a string argument", name)))
}

fn parse_intrinsic(name: &str, arg: &Value) -> TemplateResult<Option<Intrinsic>> {
    let intrinsic = match name {
        "Ref" => Intrinsic::Ref(string_arg(name, arg)?),
        "Fn::GetAtt" => match arg {
            Value::String(dotted) => {
                let (logical_id, attribute) = dotted.split_once('.').ok_or_else(|| {
                    TemplateError::Invalid(format!("Fn::GetAtt '{}' has no attribute", dotted))
                })?;
                Intrinsic::get_att(logical_id, attribute)
            }
            _ => {
                let items = args(name, arg, 2)?;
                Intrinsic::GetAtt {
                    logical_id: string_arg(name, &items[0])?,
                    attribute: parse_value(&items[1])?,
                }
            }
        },
        "Fn::Sub" => match arg {
            Value::String(expression) => Intrinsic::Sub {
                expression: expression.clone(),
                variables: IndexMap::new(),
            },
            _ => {
                let items = args(name, arg, 2)?;
                let mut variables = IndexMap::new();
                for (k, v) in items[1].as_object().unwrap_or(&Map::new()) {
                    variables.insert(k.clone(), parse_value(v)?);
                }
                Intrinsic::Sub {
                    expression: string_arg(name, &items[0])?,
                    variables,
                }
            }
        },
        "Fn::Join" => {
            let items = args(name, arg, 2)?;
            Intrinsic::Join {
                separator: string_arg(name, &items[0])?,
                items: parse_value(&items[1])?,
            }
        }
        "Fn::FindInMap" => {
            let items = args(name, arg, 3)?;
            Intrinsic::FindInMap {
                map_name: parse_value(&items[0])?,
                top_level_key: parse_value(&items[1])?,
                second_level_key: parse_value(&items[2])?,
            }
        }
        "Fn::Select" => {
            let items = args(name, arg, 2)?;
            Intrinsic::Select {
                index: parse_value(&items[0])?,
                items: parse_value(&items[1])?,
            }
        }
        "Fn::Split" => {
            let items = args(name, arg, 2)?;
            Intrinsic::Split {
                delimiter: string_arg(name, &items[0])?,
                source: parse_value(&items[1])?,
            }
        }
        "Fn::Base64" => Intrinsic::Base64(parse_value(arg)?),
        "Fn::Cidr" => {
            let items = args(name, arg, 3)?;
            Intrinsic::Cidr {
                ip_block: parse_value(&items[0])?,
                count: parse_value(&items[1])?,
                cidr_bits: parse_value(&items[2])?,
            }
        }
        "Fn::GetAZs" => Intrinsic::GetAZs(parse_value(arg)?),
        "Fn::ImportValue" => Intrinsic::ImportValue(parse_value(arg)?),
        "Fn::If" => {
            let items = args(name, arg, 3)?;
            Intrinsic::If {
                condition: string_arg(name, &items[0])?,
                value_if_true: parse_value(&items[1])?,
                value_if_false: parse_value(&items[2])?,
            }
        }
        other => {
            if other.starts_with("Fn::") {
                log::debug!("Keeping unsupported function {} as a plain object", other);
            }
            return Ok(None);
        }
    };
    Ok(Some(intrinsic))
}

/// Convert YAML to JSON, expanding short-form intrinsic tags
fn yaml_to_json(value: serde_yaml::Value) -> TemplateResult<Value> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map(Value::from).unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<TemplateResult<_>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::new();
            for (k, v) in mapping {
                let key = match k {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(TemplateError::Invalid(
                            "mapping keys must be scalars".to_string(),
                        ));
                    }
                };
                out.insert(key, yaml_to_json(v)?);
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let name = tag.trim_start_matches('!');
            let key = match name {
                "Ref" | "Condition" => name.to_string(),
                _ => format!("Fn::{}", name),
            };
            let mut out = Map::new();
            out.insert(key, yaml_to_json(tagged.value)?);
            Value::Object(out)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_json_template() {
        let template = Template::from_json(&json!({
            "Parameters": {
                "Env": {"Type": "String", "Default": "dev"}
            },
            "Mappings": {
                "RegionMap": {"eu-west-1": {"ami": "ami-1"}}
            },
            "Resources": {
                "Bucket": {"Type": "AWS::S3::Bucket"},
                "Policy": {
                    "Type": "AWS::S3::BucketPolicy",
                    "Condition": "IsProd",
                    "Properties": {
                        "Bucket": {"Ref": "Bucket"},
                        "Arn": {"Fn::GetAtt": ["Bucket", "Arn"]},
                        "Dotted": {"Fn::GetAtt": "Bucket.Arn"},
                        "Count": 3
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(template.parameter("Env").unwrap().default, Some(Literal::string("dev")));
        assert_eq!(template.find_in_map("RegionMap", "eu-west-1", "ami"), Some(&Literal::string("ami-1")));

        let policy = template.resource("Policy").unwrap();
        assert_eq!(policy.condition.as_deref(), Some("IsProd"));
        assert_eq!(
            policy.properties["Bucket"],
            TemplateValue::intrinsic(Intrinsic::Ref("Bucket".to_string()))
        );
        assert_eq!(
            policy.properties["Arn"],
            TemplateValue::intrinsic(Intrinsic::get_att("Bucket", "Arn"))
        );
        assert_eq!(policy.properties["Arn"], policy.properties["Dotted"]);
        assert_eq!(policy.properties["Count"], TemplateValue::Int(3));
    }

    #[test]
    fn test_sub_forms() {
        let plain = parse_value(&json!({"Fn::Sub": "${Env}-bucket"})).unwrap();
        assert!(matches!(
            plain.as_intrinsic(),
            Some(Intrinsic::Sub { variables, .. }) if variables.is_empty()
        ));

        let with_vars = parse_value(&json!({"Fn::Sub": ["${A}", {"A": {"Ref": "Env"}}]})).unwrap();
        let Some(Intrinsic::Sub { variables, .. }) = with_vars.as_intrinsic() else {
            panic!("expected Fn::Sub");
        };
        assert_eq!(
            variables["A"],
            TemplateValue::intrinsic(Intrinsic::Ref("Env".to_string()))
        );
    }

    #[test]
    fn test_unknown_function_is_plain_map() {
        let value = parse_value(&json!({"Fn::Transform": {"Name": "x"}})).unwrap();
        assert!(matches!(value, TemplateValue::Map(_)));
    }

    #[test]
    fn test_wrong_arity_is_error() {
        assert!(parse_value(&json!({"Fn::Join": [","]})).is_err());
    }

    #[test]
    fn test_missing_resources_is_error() {
        assert!(Template::from_json(&json!({"Parameters": {}})).is_err());
    }

    #[test]
    fn test_yaml_short_form_tags() {
        let template = Template::from_yaml_str(
            r#"
Resources:
  Bucket:
    Type: AWS::S3::Bucket
  Policy:
    Type: AWS::S3::BucketPolicy
    Properties:
      Bucket: !Ref Bucket
      Arn: !GetAtt Bucket.Arn
      Name: !Sub "${AWS::StackName}-policy"
"#,
        )
        .unwrap();

        let policy = template.resource("Policy").unwrap();
        assert_eq!(
            policy.properties["Bucket"],
            TemplateValue::intrinsic(Intrinsic::Ref("Bucket".to_string()))
        );
        assert_eq!(
            policy.properties["Arn"],
            TemplateValue::intrinsic(Intrinsic::get_att("Bucket", "Arn"))
        );
        assert!(matches!(
            policy.properties["Name"].as_intrinsic(),
            Some(Intrinsic::Sub { .. })
        ));
    }
}
