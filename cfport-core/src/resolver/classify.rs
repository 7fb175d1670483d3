//! Classify - Decide what the target of a `Ref` or `Fn::GetAtt` is
//!
//! A target is an input (parameter or data source), a resource Terraform can
//! reference, or nothing usable. Attribute values are read from the
//! deploy-time snapshot of the target's state instance.

use heck::ToSnakeCase;
use serde_json::Value;

use super::DependencyResolver;
use super::extract::ReferenceKind;
use crate::catalog::ResourceMapping;
use crate::path::AttributePath;
use crate::template::{Intrinsic, Literal, TemplateValue};

const STACK_OUTPUT_PREFIX: &str = "Outputs.";

/// Outcome of a successful classification
#[derive(Debug, Clone)]
pub(crate) struct Classification<'a> {
    pub kind: ReferenceKind,
    pub target: Option<&'a ResourceMapping>,
    /// Terraform attribute path on the target, for `Fn::GetAtt`
    pub target_attribute: Option<String>,
    pub value: Literal,
}

impl Classification<'_> {
    /// Intrinsic with no referenced resource, identified by its value alone
    pub fn untargeted(value: Literal) -> Self {
        Self {
            kind: ReferenceKind::DirectReference,
            target: None,
            target_attribute: None,
            value,
        }
    }
}

/// Why an intrinsic could not be classified
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Unclassified {
    UnsupportedResource,
    UnsupportedPseudoParameter(String),
    Unreferenceable(String),
    /// A member of a composite intrinsic failed; already reported
    NestedUnresolved,
}

/// Terraform spelling of a CloudFormation attribute name, e.g. `Endpoint.Address` to `endpoint.address`
pub(crate) fn terraform_attribute_name(attribute: &str) -> String {
    if let Some(output) = attribute.strip_prefix(STACK_OUTPUT_PREFIX) {
        return format!("outputs.{}", output);
    }
    attribute
        .split('.')
        .map(|segment| segment.to_snake_case())
        .collect::<Vec<_>>()
        .join(".")
}

impl<'a> DependencyResolver<'a> {
    pub(crate) fn classify_ref(&self, name: &str) -> Result<Classification<'a>, Unclassified> {
        if let Some(input) = self.input(name) {
            return Ok(Classification {
                kind: ReferenceKind::ParameterReference,
                target: None,
                target_attribute: None,
                value: input.value.clone(),
            });
        }

        if name.starts_with("AWS::") {
            return Err(Unclassified::UnsupportedPseudoParameter(name.to_string()));
        }

        let target = self
            .catalog
            .get_supported(name)
            .ok_or(Unclassified::UnsupportedResource)?;
        Ok(Classification {
            kind: ReferenceKind::DirectReference,
            target: Some(target),
            target_attribute: None,
            value: Literal::String(target.physical_id.clone()),
        })
    }

    /// Attribute name of a `Fn::GetAtt`, which may itself be a `Ref`
    pub(crate) fn attribute_name(&self, attribute: &TemplateValue) -> Result<String, Unclassified> {
        match attribute {
            TemplateValue::String(name) => Ok(name.clone()),
            TemplateValue::Intrinsic(intrinsic) if matches!(**intrinsic, Intrinsic::Ref(_)) => intrinsic
                .evaluate(self)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| Unclassified::Unreferenceable("attribute name did not evaluate to a string".to_string())),
            _ => Err(Unclassified::Unreferenceable(
                "attribute name must be a literal or a Ref".to_string(),
            )),
        }
    }

    pub(crate) fn classify_get_att(
        &self,
        logical_id: &str,
        attribute: &str,
    ) -> Result<Classification<'a>, Unclassified> {
        let target = self
            .catalog
            .get_supported(logical_id)
            .ok_or(Unclassified::UnsupportedResource)?;
        let attributes = self.snapshot.get(logical_id).ok_or_else(|| {
            Unclassified::Unreferenceable(format!("{} has no imported state", target.address()))
        })?;

        let traits = self.traits.get(&target.target_type);
        let (path, value) = match traits.map_attribute(attribute) {
            Some(mapped) => {
                let path = AttributePath::parse(mapped);
                let value = path.get(attributes).and_then(Literal::from_json);
                (path, value)
            }
            None => match find_attribute(attributes, attribute) {
                Some((path, value)) => (path, Some(value)),
                None => (AttributePath::root(), None),
            },
        };

        let value = value.ok_or_else(|| {
            Unclassified::Unreferenceable(format!(
                "attribute '{}' not found in state of {}",
                attribute,
                target.address()
            ))
        })?;

        Ok(Classification {
            kind: ReferenceKind::AttributeReference,
            target: Some(target),
            target_attribute: Some(path.to_string()),
            value,
        })
    }
}

/// Locate a CloudFormation attribute in a Terraform attribute tree
///
/// Dotted names are looked up as paths. Plain names match the first property,
/// in document order, named like the attribute in snake case or verbatim whose
/// value is a scalar or a list of scalars.
fn find_attribute(attributes: &Value, attribute: &str) -> Option<(AttributePath, Literal)> {
    let terraform_name = terraform_attribute_name(attribute);

    if terraform_name.contains('.') {
        return [terraform_name.as_str(), attribute].into_iter().find_map(|name| {
            let path = AttributePath::parse(name);
            path.get(attributes)
                .and_then(Literal::from_json)
                .map(|value| (path, value))
        });
    }

    search(attributes, &AttributePath::root(), &[terraform_name.as_str(), attribute])
}

fn search(node: &Value, path: &AttributePath, names: &[&str]) -> Option<(AttributePath, Literal)> {
    match node {
        Value::Object(map) => {
            for (key, value) in map {
                let child = path.key(key);
                if names.contains(&key.as_str())
                    && !value.is_null()
                    && let Some(literal) = Literal::from_json(value)
                {
                    return Some((child, literal));
                }
                if let Some(found) = search(value, &child, names) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, item)| search(item, &path.index(i), names)),
        _ => None,
    }
}
