//! Pseudo parameters backed by Terraform data sources

use std::collections::HashMap;

use cfport_core::input::{DataSourceDeclaration, InputVariable};
use cfport_core::template::Literal;

struct PseudoParameter {
    name: &'static str,
    data_type: &'static str,
    data_name: &'static str,
    attribute: &'static str,
}

const PSEUDO_PARAMETERS: &[PseudoParameter] = &[
    PseudoParameter {
        name: "AWS::Region",
        data_type: "aws_region",
        data_name: "current",
        attribute: "name",
    },
    PseudoParameter {
        name: "AWS::AccountId",
        data_type: "aws_caller_identity",
        data_name: "current",
        attribute: "account_id",
    },
    PseudoParameter {
        name: "AWS::Partition",
        data_type: "aws_partition",
        data_name: "partition",
        attribute: "partition",
    },
    PseudoParameter {
        name: "AWS::URLSuffix",
        data_type: "aws_partition",
        data_name: "url_suffix",
        attribute: "dns_suffix",
    },
];

/// Data-source inputs for the pseudo parameters present in `values`
///
/// Other pseudo parameters, such as `AWS::StackName`, have no Terraform
/// equivalent and are left out.
pub fn pseudo_parameter_inputs(values: &HashMap<String, String>) -> Vec<InputVariable> {
    PSEUDO_PARAMETERS
        .iter()
        .filter_map(|p| {
            let value = values.get(p.name)?;
            Some(InputVariable::data_source(
                p.name,
                Literal::string(value.as_str()),
                format!("data.{}.{}.{}", p.data_type, p.data_name, p.attribute),
            ))
        })
        .collect()
}

/// Data blocks read by the pseudo parameter inputs
pub fn pseudo_parameter_declarations() -> Vec<DataSourceDeclaration> {
    PSEUDO_PARAMETERS
        .iter()
        .map(|p| DataSourceDeclaration::new(p.data_type, p.data_name))
        .collect()
}
