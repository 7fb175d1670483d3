//! Resolver - Replace literal state values with references to their origin
//!
//! For one resource at a time:
//! - Extract the intrinsics used by its template properties and evaluate them
//! - Find the leaves of its state instance holding those values
//! - Render each matched intrinsic as a [`Reference`](crate::reference::Reference)
//! - Write the reference tokens into the instance
//!
//! Values always come from the deploy-time snapshot, never from an instance
//! already rewritten, so resources can be resolved in any order.

pub mod apply;
mod classify;
mod extract;
pub mod matcher;
mod render;
mod synthesize;
pub mod warning;

use std::collections::HashMap;

use indexmap::IndexSet;
use log::info;
use serde_json::Value;

pub use apply::{Modification, apply_modifications};
pub use extract::{IntrinsicReference, ReferenceKind};
pub use matcher::{LeafMatch, find_matches};
pub use warning::{DependencyResolutionWarning, WarningKind};

use crate::catalog::ResourceCatalog;
use crate::input::{DataSourceDeclaration, InputVariable};
use crate::template::{EvaluationContext, Literal, Template};
use crate::traits::TraitsCollection;
use synthesize::Synthesizer;

/// Fatal error for a single resource
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Resource '{resource}' has {count} state instances; exactly one is required")]
    MultipleInstances { resource: String, count: usize },

    #[error("Resource '{0}' has no state instance")]
    NoInstance(String),

    #[error("Resource '{0}' is not declared in the template")]
    ResourceNotInTemplate(String),
}

/// Access to the attribute tree of a state instance
pub trait InstanceAttributes {
    fn attributes(&self) -> &Value;
    fn attributes_mut(&mut self) -> &mut Value;
}

impl InstanceAttributes for Value {
    fn attributes(&self) -> &Value {
        self
    }

    fn attributes_mut(&mut self) -> &mut Value {
        self
    }
}

/// Deploy-time attributes of every imported resource, keyed by logical id
pub type AttributeSnapshot = HashMap<String, Value>;

/// Facts about the deployed stack that the template does not carry
#[derive(Debug, Clone, Default)]
pub struct StackFacts {
    /// Values of pseudo parameters that are not inputs, e.g. `AWS::StackName`
    pub pseudo_parameters: HashMap<String, Literal>,
    pub exports: HashMap<String, String>,
    pub availability_zones: HashMap<String, Vec<String>>,
}

impl StackFacts {
    pub fn with_pseudo_parameter(mut self, name: impl Into<String>, value: Literal) -> Self {
        self.pseudo_parameters.insert(name.into(), value);
        self
    }

    pub fn with_export(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.exports.insert(name.into(), value.into());
        self
    }

    pub fn with_availability_zones(mut self, region: impl Into<String>, zones: Vec<String>) -> Self {
        self.availability_zones.insert(region.into(), zones);
        self
    }
}

/// Outcome of resolving one resource
#[derive(Debug, Clone, Default)]
pub struct ResourceResolution {
    pub resource: String,
    /// Number of leaves replaced with a reference
    pub modifications: usize,
    pub warnings: Vec<DependencyResolutionWarning>,
    /// Data blocks first needed by this resource
    pub data_sources: Vec<DataSourceDeclaration>,
    /// `type.name` of every data block its references read
    pub data_blocks: Vec<String>,
}

/// Aggregate of a run over many resources
#[derive(Debug, Default)]
pub struct ResolutionReport {
    pub resolutions: Vec<ResourceResolution>,
    pub errors: Vec<ResolveError>,
    /// Declarations needed by the run, one per address
    pub data_sources: Vec<DataSourceDeclaration>,
    pub data_blocks: IndexSet<String>,
}

impl ResolutionReport {
    pub fn record(&mut self, result: Result<ResourceResolution, ResolveError>) {
        match result {
            Ok(resolution) => {
                for declaration in &resolution.data_sources {
                    if !self
                        .data_sources
                        .iter()
                        .any(|d| d.address() == declaration.address())
                    {
                        self.data_sources.push(declaration.clone());
                    }
                }
                self.data_blocks.extend(resolution.data_blocks.iter().cloned());
                self.resolutions.push(resolution);
            }
            Err(e) => self.errors.push(e),
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DependencyResolutionWarning> {
        self.resolutions.iter().flat_map(|r| r.warnings.iter())
    }

    pub fn modification_count(&self) -> usize {
        self.resolutions.iter().map(|r| r.modifications).sum()
    }
}

/// Resolves dependencies of imported resources
pub struct DependencyResolver<'a> {
    pub(crate) template: &'a Template,
    pub(crate) catalog: &'a ResourceCatalog,
    pub(crate) traits: &'a TraitsCollection,
    pub(crate) inputs: &'a [InputVariable],
    pub(crate) snapshot: &'a AttributeSnapshot,
    pub(crate) facts: StackFacts,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        template: &'a Template,
        catalog: &'a ResourceCatalog,
        traits: &'a TraitsCollection,
        inputs: &'a [InputVariable],
        snapshot: &'a AttributeSnapshot,
    ) -> Self {
        Self {
            template,
            catalog,
            traits,
            inputs,
            snapshot,
            facts: StackFacts::default(),
        }
    }

    pub fn with_facts(mut self, facts: StackFacts) -> Self {
        self.facts = facts;
        self
    }

    pub(crate) fn input(&self, name: &str) -> Option<&'a InputVariable> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Resolve the template resource `logical_id` against its state instance
    ///
    /// `instances` must hold exactly one instance. It is rewritten in place.
    pub fn resolve<I: InstanceAttributes>(
        &self,
        logical_id: &str,
        instances: &mut [I],
    ) -> Result<ResourceResolution, ResolveError> {
        let resource = self
            .template
            .resource(logical_id)
            .ok_or_else(|| ResolveError::ResourceNotInTemplate(logical_id.to_string()))?;
        let count = instances.len();
        let instance = match instances {
            [instance] => instance,
            [] => return Err(ResolveError::NoInstance(logical_id.to_string())),
            _ => {
                return Err(ResolveError::MultipleInstances {
                    resource: logical_id.to_string(),
                    count,
                });
            }
        };

        let extraction = extract::extract(self, resource);
        let target_type = self
            .catalog
            .get(logical_id)
            .map(|m| m.target_type.as_str())
            .unwrap_or_default();
        let traits = self.traits.get(target_type);

        let mut synthesizer = Synthesizer::new(self);
        let modifications: Vec<Modification> =
            find_matches(instance.attributes(), &extraction.references, traits)
                .into_iter()
                .map(|m| Modification {
                    reference: synthesizer.synthesize(m.intrinsic),
                    location: m.location,
                    containing: m.containing,
                })
                .collect();

        let applied = apply_modifications(instance.attributes_mut(), &modifications);
        let (data_sources, data_blocks) = synthesizer.into_parts();

        info!(
            "{}: {} intrinsics, {} references written, {} warnings",
            logical_id,
            extraction.references.len(),
            applied,
            extraction.warnings.len()
        );

        Ok(ResourceResolution {
            resource: logical_id.to_string(),
            modifications: applied,
            warnings: extraction.warnings,
            data_sources,
            data_blocks,
        })
    }
}

impl EvaluationContext for DependencyResolver<'_> {
    fn template(&self) -> &Template {
        self.template
    }

    fn ref_value(&self, name: &str) -> Option<Literal> {
        if let Some(input) = self.input(name) {
            return Some(input.value.clone());
        }
        if let Some(value) = self.facts.pseudo_parameters.get(name) {
            return Some(value.clone());
        }
        self.catalog
            .get(name)
            .map(|m| Literal::String(m.physical_id.clone()))
    }

    fn attribute_value(&self, logical_id: &str, attribute: &str) -> Option<Literal> {
        self.classify_get_att(logical_id, attribute)
            .ok()
            .map(|c| c.value)
    }

    fn export_value(&self, name: &str) -> Option<Literal> {
        self.facts.exports.get(name).map(Literal::string)
    }

    fn availability_zones(&self, region: &str) -> Option<Vec<String>> {
        self.facts.availability_zones.get(region).cloned()
    }
}
