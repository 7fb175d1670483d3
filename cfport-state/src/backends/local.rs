//! Terraform state kept in a local `terraform.tfstate`-style file
//!
//! An overwrite first copies the previous state to `<file>.backup`.

use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::state::StateFile;

/// State kept in a file on the local filesystem
pub struct LocalBackend {
    state_path: PathBuf,
    /// Copy the previous state aside before overwriting it
    backup: bool,
}

impl LocalBackend {
    /// File name Terraform uses for local state
    pub const DEFAULT_STATE_FILE: &'static str = "terraform.tfstate";

    /// State in the working directory
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    pub fn with_path(state_path: PathBuf) -> Self {
        Self {
            state_path,
            backup: true,
        }
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn state_path(&self) -> &PathBuf {
        &self.state_path
    }

    /// Path of the backup written before an overwrite
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.state_path.clone().into_os_string();
        name.push(".backup");
        PathBuf::from(name)
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let path = &self.state_path;
        if !path.is_file() {
            debug!("No state at {}", path.display());
            return Ok(None);
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| BackendError::Io(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| BackendError::InvalidState(format!("{}: {}", path.display(), e)))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        let text = serde_json::to_string_pretty(state).map_err(|e| BackendError::Serialization(e.to_string()))?;

        if self.backup && self.state_path.exists() {
            let backup = self.backup_path();
            std::fs::copy(&self.state_path, &backup)
                .map_err(|e| BackendError::Io(format!("Failed to back up state file: {}", e)))?;
            debug!("Previous state saved to {}", backup.display());
        }

        std::fs::write(&self.state_path, text)
            .map_err(|e| BackendError::Io(format!("{}: {}", self.state_path.display(), e)))
    }

    fn describe(&self) -> String {
        self.state_path.display().to_string()
    }
}
