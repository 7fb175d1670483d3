//! Evaluate - Compute the deployed value of an intrinsic
//!
//! Evaluation reproduces what CloudFormation computed when the stack was
//! deployed. Values for `Ref` and `Fn::GetAtt` come from an
//! [`EvaluationContext`], which knows the stack's parameters and the current
//! state of its resources.

use ipnet::IpNet;
use thiserror::Error;

use super::intrinsic::{Intrinsic, SubSegment, parse_sub};
use super::{Literal, Template, TemplateValue};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Unresolvable reference '{0}'")]
    UnresolvedRef(String),

    #[error("Unable to evaluate attribute '{attribute}' of '{logical_id}'")]
    UnresolvedAttribute {
        logical_id: String,
        attribute: String,
    },

    #[error("Unknown condition '{0}'")]
    UnknownCondition(String),

    #[error("No mapping entry {map_name}.{top_level_key}.{second_level_key}")]
    MappingNotFound {
        map_name: String,
        top_level_key: String,
        second_level_key: String,
    },

    #[error("{function}: {message}")]
    InvalidArgument {
        function: &'static str,
        message: String,
    },

    #[error("Invalid template: {0}")]
    Invalid(String),

    #[error("Failed to parse template: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to parse template: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// Source of deploy-time values for intrinsic evaluation
pub trait EvaluationContext {
    fn template(&self) -> &Template;

    /// Value of `Ref` to a parameter, pseudo parameter or resource
    fn ref_value(&self, name: &str) -> Option<Literal>;

    /// Value of `Fn::GetAtt`
    fn attribute_value(&self, logical_id: &str, attribute: &str) -> Option<Literal>;

    /// Value of a stack export, for `Fn::ImportValue`
    fn export_value(&self, _name: &str) -> Option<Literal> {
        None
    }

    /// Availability zones of a region, for `Fn::GetAZs`
    fn availability_zones(&self, _region: &str) -> Option<Vec<String>> {
        None
    }
}

fn invalid(function: &'static str, message: impl Into<String>) -> TemplateError {
    TemplateError::InvalidArgument {
        function,
        message: message.into(),
    }
}

/// Evaluate any property value; maps cannot be represented as a [`Literal`]
pub fn evaluate_value(value: &TemplateValue, ctx: &dyn EvaluationContext) -> TemplateResult<Literal> {
    match value {
        TemplateValue::Intrinsic(intrinsic) => intrinsic.evaluate(ctx),
        TemplateValue::List(items) => items
            .iter()
            .map(|item| evaluate_value(item, ctx))
            .collect::<TemplateResult<Vec<_>>>()
            .map(Literal::List),
        TemplateValue::Map(_) => Err(TemplateError::Invalid(
            "an object cannot be used as a scalar value".to_string(),
        )),
        other => other
            .to_literal()
            .ok_or_else(|| TemplateError::Invalid("unexpected value".to_string())),
    }
}

fn evaluate_string(
    value: &TemplateValue,
    ctx: &dyn EvaluationContext,
    function: &'static str,
) -> TemplateResult<String> {
    evaluate_value(value, ctx)?
        .to_interpolated()
        .ok_or_else(|| invalid(function, "expected a string"))
}

fn evaluate_index(
    value: &TemplateValue,
    ctx: &dyn EvaluationContext,
    function: &'static str,
) -> TemplateResult<usize> {
    let n = evaluate_value(value, ctx)?
        .as_number()
        .ok_or_else(|| invalid(function, "expected a number"))?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(invalid(function, format!("{} is not a valid index", n)));
    }
    Ok(n as usize)
}

impl Intrinsic {
    pub fn evaluate(&self, ctx: &dyn EvaluationContext) -> TemplateResult<Literal> {
        match self {
            Intrinsic::Ref(name) => ctx
                .ref_value(name)
                .ok_or_else(|| TemplateError::UnresolvedRef(name.clone())),

            Intrinsic::GetAtt {
                logical_id,
                attribute,
            } => {
                let attribute = evaluate_string(attribute, ctx, "Fn::GetAtt")?;
                ctx.attribute_value(logical_id, &attribute)
                    .ok_or_else(|| TemplateError::UnresolvedAttribute {
                        logical_id: logical_id.clone(),
                        attribute,
                    })
            }

            Intrinsic::Sub {
                expression,
                variables,
            } => {
                let mut out = String::new();
                for segment in parse_sub(expression) {
                    match segment {
                        SubSegment::Literal(text) => out.push_str(&text),
                        SubSegment::Placeholder(name) => {
                            let value = match variables.get(&name) {
                                Some(v) => evaluate_value(v, ctx)?,
                                None => implicit_sub_reference(&name).evaluate(ctx)?,
                            };
                            let text = value.to_interpolated().ok_or_else(|| {
                                invalid("Fn::Sub", format!("'{}' is not a string", name))
                            })?;
                            out.push_str(&text);
                        }
                    }
                }
                Ok(Literal::String(out))
            }

            Intrinsic::Join { separator, items } => {
                let items = evaluate_value(items, ctx)?;
                let items = items
                    .as_list()
                    .ok_or_else(|| invalid("Fn::Join", "expected a list"))?;
                let parts = items
                    .iter()
                    .map(|i| {
                        i.to_interpolated()
                            .ok_or_else(|| invalid("Fn::Join", "list items must be scalars"))
                    })
                    .collect::<TemplateResult<Vec<_>>>()?;
                Ok(Literal::String(parts.join(separator.as_str())))
            }

            Intrinsic::FindInMap {
                map_name,
                top_level_key,
                second_level_key,
            } => {
                let map_name = evaluate_string(map_name, ctx, "Fn::FindInMap")?;
                let top_level_key = evaluate_string(top_level_key, ctx, "Fn::FindInMap")?;
                let second_level_key = evaluate_string(second_level_key, ctx, "Fn::FindInMap")?;
                ctx.template()
                    .find_in_map(&map_name, &top_level_key, &second_level_key)
                    .cloned()
                    .ok_or(TemplateError::MappingNotFound {
                        map_name,
                        top_level_key,
                        second_level_key,
                    })
            }

            Intrinsic::Select { index, items } => {
                let index = evaluate_index(index, ctx, "Fn::Select")?;
                let items = evaluate_value(items, ctx)?;
                let items = items
                    .as_list()
                    .ok_or_else(|| invalid("Fn::Select", "expected a list"))?;
                items.get(index).cloned().ok_or_else(|| {
                    invalid(
                        "Fn::Select",
                        format!("index {} out of range for list of {}", index, items.len()),
                    )
                })
            }

            Intrinsic::Split { delimiter, source } => {
                let source = evaluate_string(source, ctx, "Fn::Split")?;
                Ok(Literal::List(
                    source
                        .split(delimiter.as_str())
                        .map(Literal::string)
                        .collect(),
                ))
            }

            Intrinsic::Base64(value) => {
                let text = evaluate_string(value, ctx, "Fn::Base64")?;
                Ok(Literal::String(data_encoding::BASE64.encode(text.as_bytes())))
            }

            Intrinsic::Cidr {
                ip_block,
                count,
                cidr_bits,
            } => {
                let ip_block = evaluate_string(ip_block, ctx, "Fn::Cidr")?;
                let count = evaluate_index(count, ctx, "Fn::Cidr")?;
                let cidr_bits = evaluate_index(cidr_bits, ctx, "Fn::Cidr")?;
                cidr_subnets(&ip_block, count, cidr_bits).map(Literal::List)
            }

            Intrinsic::GetAZs(region) => {
                let mut region = evaluate_string(region, ctx, "Fn::GetAZs")?;
                if region.is_empty() {
                    region = ctx
                        .ref_value("AWS::Region")
                        .and_then(|r| r.as_str().map(str::to_string))
                        .ok_or_else(|| TemplateError::UnresolvedRef("AWS::Region".to_string()))?;
                }
                ctx.availability_zones(&region)
                    .map(|zones| Literal::List(zones.into_iter().map(Literal::String).collect()))
                    .ok_or_else(|| invalid("Fn::GetAZs", format!("no zones known for {}", region)))
            }

            Intrinsic::ImportValue(name) => {
                let name = evaluate_string(name, ctx, "Fn::ImportValue")?;
                ctx.export_value(&name)
                    .ok_or_else(|| invalid("Fn::ImportValue", format!("no export named '{}'", name)))
            }

            Intrinsic::If {
                condition,
                value_if_true,
                value_if_false,
            } => match ctx.template().condition(condition) {
                Some(true) => evaluate_value(value_if_true, ctx),
                Some(false) => evaluate_value(value_if_false, ctx),
                None => Err(TemplateError::UnknownCondition(condition.clone())),
            },
        }
    }
}

/// Intrinsic implied by a `${Name}` or `${Resource.Attribute}` placeholder
pub fn implicit_sub_reference(name: &str) -> Intrinsic {
    match name.split_once('.') {
        Some((logical_id, attribute)) => Intrinsic::get_att(logical_id, attribute),
        None => Intrinsic::Ref(name.to_string()),
    }
}

fn cidr_subnets(ip_block: &str, count: usize, cidr_bits: usize) -> TemplateResult<Vec<Literal>> {
    let net: IpNet = ip_block
        .parse()
        .map_err(|_| invalid("Fn::Cidr", format!("'{}' is not a CIDR block", ip_block)))?;
    let max = net.max_prefix_len() as usize;
    if cidr_bits > max {
        return Err(invalid("Fn::Cidr", format!("{} subnet bits is too many", cidr_bits)));
    }
    let subnets = net
        .trunc()
        .subnets((max - cidr_bits) as u8)
        .map_err(|e| invalid("Fn::Cidr", e.to_string()))?;
    let subnets: Vec<Literal> = subnets
        .take(count)
        .map(|s| Literal::String(s.to_string()))
        .collect();
    if subnets.len() < count {
        return Err(invalid("Fn::Cidr", format!("{} cannot hold {} subnets", ip_block, count)));
    }
    Ok(subnets)
}
