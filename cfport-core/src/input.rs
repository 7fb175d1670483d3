//! Input - Declared inputs and data sources of the generated configuration

use indexmap::IndexMap;

use crate::template::{Literal, Parameter};

/// How an input is referenced from generated configuration
#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    /// Terraform variable, referenced as `var.<name>`
    Variable,
    /// Data source attribute, e.g. `data.aws_region.current.name`
    DataSource { address: String },
}

/// Template parameter or pseudo parameter surfaced as a Terraform input
#[derive(Debug, Clone, PartialEq)]
pub struct InputVariable {
    /// Parameter name as written in the template (`Env`, `AWS::Region`)
    pub name: String,
    /// Value the parameter had when the stack was deployed
    pub value: Literal,
    pub kind: InputKind,
    /// Data block this input owns and the configuration must declare
    pub declaration: Option<DataSourceDeclaration>,
}

impl InputVariable {
    pub fn variable(name: impl Into<String>, value: Literal) -> Self {
        Self {
            name: name.into(),
            value,
            kind: InputKind::Variable,
            declaration: None,
        }
    }

    pub fn data_source(name: impl Into<String>, value: Literal, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            kind: InputKind::DataSource {
                address: address.into(),
            },
            declaration: None,
        }
    }

    /// Parameter resolved from Parameter Store key `parameter_key`
    pub fn ssm_parameter(name: impl Into<String>, value: Literal, parameter_key: impl Into<String>) -> Self {
        let name = name.into();
        let declaration =
            DataSourceDeclaration::new("aws_ssm_parameter", &name).with_argument("name", parameter_key);
        let address = format!("data.{}.value", declaration.address());
        Self {
            declaration: Some(declaration),
            ..Self::data_source(name, value, address)
        }
    }

    /// Point the Parameter Store lookup at `parameter_key`
    pub fn with_parameter_key(mut self, parameter_key: impl Into<String>) -> Self {
        if let Some(declaration) = self.declaration.take() {
            self.declaration = Some(declaration.with_argument("name", parameter_key));
        }
        self
    }

    /// Input for a template parameter with the value it was deployed with
    ///
    /// SSM parameters become `aws_ssm_parameter` data sources looked up by
    /// the parameter's default key; list parameters supplied as comma
    /// separated text are split.
    pub fn from_parameter(parameter: &Parameter, value: Literal) -> Self {
        let value = match value {
            Literal::String(s) if parameter.is_list() => {
                Literal::List(s.split(',').map(|v| Literal::string(v.trim())).collect())
            }
            other => other,
        };
        if parameter.is_ssm_parameter() {
            let key = match &parameter.default {
                Some(Literal::String(key)) => key.clone(),
                _ => parameter.name.clone(),
            };
            Self::ssm_parameter(&parameter.name, value, key)
        } else {
            Self::variable(&parameter.name, value)
        }
    }

    pub fn is_data_source(&self) -> bool {
        matches!(self.kind, InputKind::DataSource { .. })
    }

    /// Expression that reads this input
    pub fn address(&self) -> String {
        match &self.kind {
            InputKind::Variable => format!("var.{}", self.name),
            InputKind::DataSource { address } => address.clone(),
        }
    }

    /// `type.name` of the data block behind a data-source input
    pub fn block_address(&self) -> Option<String> {
        match &self.kind {
            InputKind::Variable => None,
            InputKind::DataSource { address } => data_block_address(address),
        }
    }
}

/// `aws_region.current` from `data.aws_region.current.name`
pub fn data_block_address(address: &str) -> Option<String> {
    let rest = address.strip_prefix("data.")?;
    let mut parts = rest.splitn(3, '.');
    let data_type = parts.next()?;
    let name = parts.next()?;
    let name = name.split('[').next().unwrap_or(name);
    Some(format!("{}.{}", data_type, name))
}

/// Data block the generated configuration has to declare
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceDeclaration {
    pub data_type: String,
    pub name: String,
    pub arguments: IndexMap<String, String>,
}

impl DataSourceDeclaration {
    pub fn new(data_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            name: name.into(),
            arguments: IndexMap::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn address(&self) -> String {
        format!("{}.{}", self.data_type, self.name)
    }
}
