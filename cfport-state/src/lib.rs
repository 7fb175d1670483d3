//! cfport State Management
//!
//! Terraform state handling for cfport.
//!
//! # Overview
//!
//! - **StateFile**: a `terraform.tfstate` document, carried through losslessly
//! - **StateBackend**: a trait for state storage, with a local file backend
//! - **resolve_dependencies**: runs dependency resolution over every imported resource
//!
//! # Example
//!
//! ```ignore
//! use cfport_state::{LocalBackend, StateBackend, resolve_dependencies};
//!
//! let backend = LocalBackend::with_path("terraform.tfstate".into());
//! let mut state = backend.require_state().await?;
//!
//! let snapshot = state.attribute_snapshot();
//! let resolver = DependencyResolver::new(&template, &catalog, &traits, &inputs, &snapshot);
//! let report = resolve_dependencies(&mut state, &resolver);
//!
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod resolve;
pub mod state;

// Re-export main types for convenience
pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::LocalBackend;
pub use resolve::resolve_dependencies;
pub use state::{ResourceInstance, StateError, StateFile, StateResource, TokenLocation};
