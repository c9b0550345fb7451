//! Remote execution channel
//!
//! Runs shell commands on a node host and copies files to it. Connection
//! failures (`OpsError::ConnectError`) are kept distinct from commands that
//! ran and exited nonzero (`OpsError::CommandError`).

pub mod local;
pub mod process;
pub mod ssh;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::OpsError;

pub use local::LocalChannel;
pub use ssh::SshChannel;

/// Output of a command that exited successfully
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Channel to run commands on, and copy files to, a host as a user
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run `command` through the remote shell, bounded by `timeout`.
    /// A nonzero exit is returned as `OpsError::CommandError`.
    async fn execute(
        &self,
        host: &str,
        user: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, OpsError>;

    /// Copy a local file to `remote_path`
    async fn upload(
        &self,
        host: &str,
        user: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), OpsError>;
}

/// Quote a value for a POSIX shell, with no expansion
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Quote a path for a POSIX shell while still expanding `$HOME`
pub fn shell_path(value: &str) -> String {
    let escaped = value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('`', "\\`");
    format!("\"{}\"", escaped)
}
