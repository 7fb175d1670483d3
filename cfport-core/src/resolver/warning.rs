//! Warnings raised while resolving a resource's dependencies
//!
//! A warning never stops resolution. The value it concerns keeps its literal
//! form in the state and the caller reports the warning so someone can fix the
//! reference by hand.

use std::fmt;

use crate::path::AttributePath;

#[derive(Debug, Clone, PartialEq)]
pub enum WarningKind {
    /// Target resource has no Terraform representation
    UnsupportedResource,
    /// Pseudo parameter with no data source equivalent
    UnsupportedPseudoParameter { parameter: String },
    /// Intrinsic that cannot be evaluated or referenced
    UnreferenceableIntrinsic { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependencyResolutionWarning {
    pub kind: WarningKind,
    /// Logical id of the resource whose property holds the intrinsic
    pub resource: String,
    pub resource_type: String,
    /// The offending intrinsic, e.g. `!Ref Seeder`
    pub intrinsic: String,
    pub location: AttributePath,
}

impl DependencyResolutionWarning {
    pub fn new(
        kind: WarningKind,
        resource: impl Into<String>,
        resource_type: impl Into<String>,
        intrinsic: impl Into<String>,
        location: AttributePath,
    ) -> Self {
        Self {
            kind,
            resource: resource.into(),
            resource_type: resource_type.into(),
            intrinsic: intrinsic.into(),
            location,
        }
    }
}

impl fmt::Display for DependencyResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WarningKind::UnsupportedResource => write!(
                f,
                "Resource '{}' ({}): Unable to create reference to a resource not supported by Terraform at {} ({}). HCL will contain current attribute value.",
                self.resource, self.resource_type, self.location, self.intrinsic
            ),
            WarningKind::UnsupportedPseudoParameter { parameter } => write!(
                f,
                "Resource \"{}\" ({}): Unable to create reference for unsupported pseudo parameter \"{}\" at property \"{}\". HCL will contain current attribute value.",
                self.resource, self.resource_type, parameter, self.location
            ),
            WarningKind::UnreferenceableIntrinsic { reason } => write!(
                f,
                "Resource '{}' ({}): Unable to create reference for {} at {}: {}. HCL will contain current attribute value.",
                self.resource, self.resource_type, self.intrinsic, self.location, reason
            ),
        }
    }
}
