//! cfport Core
//!
//! Dependency resolution for CloudFormation stacks imported into Terraform:
//! literal values in imported state are traced back to the intrinsic functions
//! that produced them and replaced with references

pub mod catalog;
pub mod input;
pub mod path;
pub mod reference;
pub mod resolver;
pub mod template;
pub mod traits;
