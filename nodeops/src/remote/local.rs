//! Local transport for multi-node test networks on one machine

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::OpsError;
use crate::remote::process::{check_output, run_command};
use crate::remote::{CommandOutput, RemoteChannel};

/// Runs commands with `sh -c` on the invoking host; host and user are ignored
#[derive(Debug, Clone, Default)]
pub struct LocalChannel {
    stream_output: bool,
}

impl LocalChannel {
    pub fn new(stream_output: bool) -> Self {
        Self { stream_output }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(path.replace("$HOME", &home)),
        Err(_) => PathBuf::from(path),
    }
}

#[async_trait]
impl RemoteChannel for LocalChannel {
    async fn execute(
        &self,
        host: &str,
        _user: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, OpsError> {
        debug!("local ({}): {}", host, command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);

        let label = self.stream_output.then_some(host);
        let result = run_command(cmd, timeout, label).await;
        check_output(host, command, "sh", result, timeout, None)
    }

    async fn upload(
        &self,
        _host: &str,
        _user: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), OpsError> {
        let destination = expand_home(remote_path);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &destination).await?;
        Ok(())
    }
}
