use std::path::PathBuf;

use cfport_core::template::TemplateError;
use cfport_provider_aws::TraitsLoadError;
use cfport_state::{BackendError, StateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid stack description {}: {source}", path.display())]
    StackDescription {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Traits(#[from] TraitsLoadError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resources that hit a fatal error, already pluralized
    #[error("{0} could not be resolved")]
    Unresolved(String),
}

pub type CliResult<T> = Result<T, CliError>;
