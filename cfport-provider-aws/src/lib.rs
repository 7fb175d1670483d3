//! cfport AWS Provider
//!
//! What cfport knows about AWS and the Terraform AWS provider: how
//! CloudFormation resource types map to Terraform ones, schema traits of the
//! Terraform resources, and the data sources standing in for pseudo parameters

pub mod pseudo;
pub mod resource_types;
pub mod traits;

pub use pseudo::{pseudo_parameter_declarations, pseudo_parameter_inputs};
pub use resource_types::{UNSUPPORTED_RESOURCES, is_unsupported, terraform_type};
pub use traits::{TraitsLoadError, load_traits, parse_traits, resource_traits};
