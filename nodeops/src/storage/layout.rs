//! Local working directory layout

use std::path::PathBuf;

use crate::errors::OpsError;

/// Local storage layout for build artifacts and run logs
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Persisted deployment logs, one JSON file per run
    pub fn runs_dir(&self) -> PathBuf {
        self.base_dir.join("runs")
    }

    /// Compiled daemon binaries
    pub fn build_dir(&self) -> PathBuf {
        self.base_dir.join("build")
    }

    /// Create the directories
    pub async fn setup(&self) -> Result<(), OpsError> {
        tokio::fs::create_dir_all(self.runs_dir()).await?;
        tokio::fs::create_dir_all(self.build_dir()).await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new(".nodeops")
    }
}
