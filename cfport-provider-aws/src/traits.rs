//! Schema traits of Terraform AWS resources
//!
//! Traits ship embedded in the crate and can be replaced by a file with the
//! same layout: a YAML list of [`ResourceTraits`] records, one of them for the
//! shared `all` type.

use std::fs;
use std::path::Path;

use cfport_core::traits::{ResourceTraits, TraitsCollection};
use log::debug;

const EMBEDDED_TRAITS: &str = include_str!("resource_traits.yaml");

#[derive(Debug, thiserror::Error)]
pub enum TraitsLoadError {
    #[error("Failed to read traits file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid traits document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Parse a traits document
pub fn parse_traits(yaml: &str) -> Result<TraitsCollection, TraitsLoadError> {
    let records: Vec<ResourceTraits> = serde_yaml::from_str(yaml)?;
    let collection = TraitsCollection::new(records);
    debug!("Loaded traits for {} resource types", collection.len());
    Ok(collection)
}

/// Traits embedded in this crate
pub fn resource_traits() -> Result<TraitsCollection, TraitsLoadError> {
    parse_traits(EMBEDDED_TRAITS)
}

/// Traits from `path`, or the embedded ones
pub fn load_traits(path: Option<&Path>) -> Result<TraitsCollection, TraitsLoadError> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| TraitsLoadError::Io {
                path: path.display().to_string(),
                source,
            })?;
            parse_traits(&text)
        }
        None => resource_traits(),
    }
}
