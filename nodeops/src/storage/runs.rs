//! Persisted deployment logs

use std::path::PathBuf;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::OpsError;
use crate::models::deployment::DeploymentLog;

/// Directory of deployment logs, one `<run_id>.json` per run
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    /// Write the log atomically so a crash never leaves a truncated record
    pub async fn save(&self, log: &DeploymentLog) -> Result<PathBuf, OpsError> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&log.run_id);
        let temp_path = path.with_extension("tmp");
        let contents = serde_json::to_vec_pretty(log)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;
        Ok(path)
    }

    pub async fn load(&self, run_id: &str) -> Result<DeploymentLog, OpsError> {
        let path = self.path_for(run_id);
        if fs::metadata(&path).await.is_err() {
            return Err(OpsError::NotFound(format!("deployment run {}", run_id)));
        }
        let contents = fs::read(&path).await?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// All stored logs, oldest first
    pub async fn list(&self) -> Result<Vec<DeploymentLog>, OpsError> {
        let mut logs = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(logs),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read(&path).await?;
            match serde_json::from_slice::<DeploymentLog>(&contents) {
                Ok(log) => logs.push(log),
                Err(e) => tracing::warn!("Skipping unreadable run log {}: {}", path.display(), e),
            }
        }

        logs.sort_by_key(|log| log.started_at);
        Ok(logs)
    }
}
