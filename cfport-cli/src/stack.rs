//! Stack description - deploy-time facts a template alone does not carry

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use cfport_core::catalog::{ResourceCatalog, ResourceMapping};
use cfport_core::input::InputVariable;
use cfport_core::resolver::StackFacts;
use cfport_core::template::{Literal, Parameter, Template};
use cfport_provider_aws::{UNSUPPORTED_RESOURCES, pseudo_parameter_inputs, terraform_type};
use cfport_state::StateFile;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{CliError, CliResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackDescription {
    #[serde(default)]
    pub stack_name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default, rename = "URLSuffix")]
    pub url_suffix: Option<String>,
    #[serde(default)]
    pub parameters: IndexMap<String, StackParameter>,
    #[serde(default)]
    pub conditions: IndexMap<String, bool>,
    #[serde(default)]
    pub resources: Vec<StackResource>,
    #[serde(default)]
    pub exports: IndexMap<String, String>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
}

/// A parameter value, either bare or with its declared type
///
/// For Parameter Store parameters `Value` is the parameter key and
/// `ResolvedValue` the value the stack was deployed with.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StackParameter {
    Detailed {
        #[serde(rename = "Value")]
        value: serde_json::Value,
        #[serde(rename = "ResolvedValue", default)]
        resolved_value: Option<serde_json::Value>,
        #[serde(rename = "Type", default)]
        parameter_type: Option<String>,
        #[serde(rename = "IsSsmParameter", default)]
        is_ssm_parameter: bool,
    },
    Value(serde_json::Value),
}

impl StackParameter {
    fn value(&self) -> &serde_json::Value {
        match self {
            StackParameter::Detailed {
                resolved_value: Some(resolved),
                ..
            } => resolved,
            StackParameter::Detailed { value, .. } => value,
            StackParameter::Value(value) => value,
        }
    }

    /// Parameter Store key, when the value was resolved from one
    fn parameter_key(&self) -> Option<&str> {
        match self {
            StackParameter::Detailed {
                value,
                resolved_value: Some(_),
                ..
            } => value.as_str(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackResource {
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub module: Option<String>,
}

impl StackDescription {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CliError::StackDescription {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Pseudo parameter values known for the stack
    pub fn pseudo_parameters(&self) -> HashMap<String, String> {
        [
            ("AWS::StackName", &self.stack_name),
            ("AWS::Region", &self.region),
            ("AWS::AccountId", &self.account_id),
            ("AWS::Partition", &self.partition),
            ("AWS::URLSuffix", &self.url_suffix),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name.to_string(), v.clone())))
        .collect()
    }

    /// Record the deployed condition outcomes on the template
    pub fn apply_conditions(&self, mut template: Template) -> Template {
        for (name, value) in &self.conditions {
            template = template.with_condition(name, *value);
        }
        template
    }

    /// Catalog of the stack resources
    ///
    /// The Terraform type is taken from the state resource imported under the
    /// same logical id, falling back to the known type table.
    pub fn catalog(&self, state: &StateFile) -> ResourceCatalog {
        let mappings = self
            .resources
            .iter()
            .map(|r| {
                let target_type = state
                    .find_by_logical_id(&r.logical_resource_id)
                    .map(|s| s.resource_type.clone())
                    .or_else(|| terraform_type(&r.resource_type).map(str::to_string))
                    .unwrap_or_default();
                let mapping = ResourceMapping::new(
                    &r.logical_resource_id,
                    &r.physical_resource_id,
                    &r.resource_type,
                    target_type,
                );
                match &r.module {
                    Some(module) => mapping.with_module(module),
                    None => mapping,
                }
            })
            .collect();
        ResourceCatalog::new(mappings).with_unsupported_types(UNSUPPORTED_RESOURCES.iter().copied())
    }

    /// Template parameters with their deployed values, then pseudo parameters
    pub fn inputs(&self, template: &Template) -> Vec<InputVariable> {
        let mut inputs = Vec::new();

        for parameter in &template.parameters {
            let supplied = self.parameters.get(&parameter.name);
            let value = match supplied {
                Some(supplied) => Literal::from_json(supplied.value()),
                None => parameter.default.clone(),
            };
            if let Some(value) = value {
                let input = InputVariable::from_parameter(parameter, value);
                inputs.push(match supplied.and_then(StackParameter::parameter_key) {
                    Some(key) => input.with_parameter_key(key),
                    None => input,
                });
            }
        }

        for (name, supplied) in &self.parameters {
            if template.parameter(name).is_some() {
                continue;
            }
            if let StackParameter::Detailed {
                parameter_type,
                is_ssm_parameter,
                ..
            } = supplied
                && let Some(value) = Literal::from_json(supplied.value())
            {
                let mut declared = parameter_type.clone().unwrap_or_else(|| "String".to_string());
                if *is_ssm_parameter {
                    declared = format!("AWS::SSM::Parameter::Value<{}>", declared);
                }
                let input = InputVariable::from_parameter(&Parameter::new(name, declared), value);
                inputs.push(match supplied.parameter_key() {
                    Some(key) => input.with_parameter_key(key),
                    None => input,
                });
            }
        }

        inputs.extend(pseudo_parameter_inputs(&self.pseudo_parameters()));
        inputs
    }

    pub fn facts(&self) -> StackFacts {
        let mut facts = StackFacts::default();
        for (name, value) in self.pseudo_parameters() {
            facts = facts.with_pseudo_parameter(name, Literal::string(value));
        }
        for (name, value) in &self.exports {
            facts = facts.with_export(name, value);
        }
        if let Some(region) = &self.region
            && !self.availability_zones.is_empty()
        {
            facts = facts.with_availability_zones(region, self.availability_zones.clone());
        }
        facts
    }
}
