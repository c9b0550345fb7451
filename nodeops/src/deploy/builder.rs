//! Daemon binary builder

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::errors::OpsError;
use crate::remote::process::{run_command, RunError};
use crate::storage::settings::BuildSettings;
use crate::utils::tail;

/// Produces a daemon binary for the plan's target OS and architecture
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    /// Build `daemon` into `output_dir` and return the artifact path
    async fn build(
        &self,
        settings: &BuildSettings,
        daemon: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, OpsError>;
}

/// File name of a cross-compiled artifact, e.g. `pokerchaind-linux-amd64`
pub fn artifact_name(daemon: &str, settings: &BuildSettings) -> String {
    format!("{}-{}-{}", daemon, settings.target_os, settings.target_arch)
}

/// Builds with the Go toolchain
#[derive(Debug, Clone, Default)]
pub struct GoBuilder {
    stream_output: bool,
}

impl GoBuilder {
    pub fn new(stream_output: bool) -> Self {
        Self { stream_output }
    }
}

#[async_trait]
impl ArtifactBuilder for GoBuilder {
    async fn build(
        &self,
        settings: &BuildSettings,
        daemon: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, OpsError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let output = output_dir.join(artifact_name(daemon, settings));

        info!(
            "Building {} for {}/{} from {}",
            daemon,
            settings.target_os,
            settings.target_arch,
            settings.source_dir.display()
        );

        let mut cmd = Command::new(&settings.go_binary);
        cmd.current_dir(&settings.source_dir)
            .arg("build")
            .arg("-o")
            .arg(&output)
            .arg(&settings.package)
            .env("GOOS", &settings.target_os)
            .env("GOARCH", &settings.target_arch)
            .env("CGO_ENABLED", "0");

        let timeout = std::time::Duration::from_secs(settings.timeout_secs);
        let label = self.stream_output.then_some("build");
        let result = match run_command(cmd, timeout, label).await {
            Ok(result) => result,
            Err(RunError::Spawn(e)) => {
                return Err(OpsError::BuildError(format!(
                    "failed to run {}: {}",
                    settings.go_binary, e
                )))
            }
            Err(RunError::TimedOut) => {
                return Err(OpsError::BuildError(format!(
                    "build did not finish within {}s",
                    settings.timeout_secs
                )))
            }
            Err(RunError::Io(e)) => return Err(OpsError::IoError(e)),
        };

        if result.exit_code != 0 {
            warn!("go build exited with {}", result.exit_code);
            return Err(OpsError::BuildError(format!(
                "go build exited with {}: {}",
                result.exit_code,
                tail(&result.stderr, 2000)
            )));
        }

        if !tokio::fs::try_exists(&output).await? {
            return Err(OpsError::BuildError(format!(
                "go build succeeded but {} is missing",
                output.display()
            )));
        }

        info!("Built {}", output.display());
        Ok(output)
    }
}
