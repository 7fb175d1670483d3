//! Catalog - Stack resources and their Terraform counterparts

use std::collections::HashSet;

/// One stack resource and the Terraform resource it was imported as
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceMapping {
    pub logical_id: String,
    pub physical_id: String,
    /// CloudFormation type, e.g. `AWS::S3::Bucket`
    pub source_type: String,
    /// Terraform type, e.g. `aws_s3_bucket`; empty when Terraform has no equivalent
    pub target_type: String,
    /// Module the resource was placed in, for nested stacks
    pub module: Option<String>,
}

impl ResourceMapping {
    pub fn new(
        logical_id: impl Into<String>,
        physical_id: impl Into<String>,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            physical_id: physical_id.into(),
            source_type: source_type.into(),
            target_type: target_type.into(),
            module: None,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Terraform resource address, e.g. `aws_s3_bucket.MyBucket`
    pub fn address(&self) -> String {
        format!("{}.{}", self.target_type, self.logical_id)
    }
}

/// Every resource of the stack being imported
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    mappings: Vec<ResourceMapping>,
    unsupported_types: HashSet<String>,
}

impl ResourceCatalog {
    pub fn new(mappings: Vec<ResourceMapping>) -> Self {
        Self {
            mappings,
            unsupported_types: HashSet::new(),
        }
    }

    /// Resource types that can never be the target of a Terraform reference
    pub fn with_unsupported_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unsupported_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn get(&self, logical_id: &str) -> Option<&ResourceMapping> {
        self.mappings.iter().find(|m| m.logical_id == logical_id)
    }

    /// Mapping for `logical_id` if Terraform can reference it
    pub fn get_supported(&self, logical_id: &str) -> Option<&ResourceMapping> {
        self.get(logical_id)
            .filter(|m| !m.target_type.is_empty() && !self.is_unsupported_type(&m.source_type))
    }

    pub fn is_unsupported_type(&self, source_type: &str) -> bool {
        source_type.starts_with("Custom::") || self.unsupported_types.contains(source_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceMapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
