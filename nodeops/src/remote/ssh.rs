//! SSH transport using the system `ssh` and `scp` clients

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::OpsError;
use crate::remote::process::{check_output, run_command};
use crate::remote::{CommandOutput, RemoteChannel};
use crate::storage::settings::SshSettings;

/// Exit status ssh and scp use for their own failures
const SSH_CONNECT_EXIT: i32 = 255;

/// Remote channel over OpenSSH in batch mode
#[derive(Debug, Clone)]
pub struct SshChannel {
    settings: SshSettings,
}

impl SshChannel {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.settings.connect_timeout_secs),
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                self.settings.strict_host_key_checking
            ),
        ];
        if let Some(identity) = &self.settings.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    /// Arguments for `ssh` running `command` on `user@host`
    pub fn ssh_args(&self, host: &str, user: &str, command: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-p".to_string());
        args.push(self.settings.port.to_string());
        args.push(format!("{}@{}", user, host));
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }

    /// Arguments for `scp` copying `local_path` to `user@host:remote_path`
    pub fn scp_args(&self, host: &str, user: &str, local_path: &Path, remote_path: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-P".to_string());
        args.push(self.settings.port.to_string());
        args.push(local_path.display().to_string());
        args.push(format!("{}@{}:{}", user, host, remote_path));
        args
    }

    fn stream_label<'a>(&self, host: &'a str) -> Option<&'a str> {
        self.settings.stream_output.then_some(host)
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn execute(
        &self,
        host: &str,
        user: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, OpsError> {
        debug!("ssh {}@{}: {}", user, host, command);

        let mut cmd = Command::new(&self.settings.ssh_binary);
        cmd.args(self.ssh_args(host, user, command));

        let result = run_command(cmd, timeout, self.stream_label(host)).await;
        check_output(
            host,
            command,
            &self.settings.ssh_binary,
            result,
            timeout,
            Some(SSH_CONNECT_EXIT),
        )
    }

    async fn upload(
        &self,
        host: &str,
        user: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<(), OpsError> {
        debug!("scp {} -> {}@{}:{}", local_path.display(), user, host, remote_path);

        let mut cmd = Command::new(&self.settings.scp_binary);
        cmd.args(self.scp_args(host, user, local_path, remote_path));

        let timeout = self.settings.command_timeout();
        let label = format!("upload {}", local_path.display());
        let result = run_command(cmd, timeout, self.stream_label(host)).await;
        check_output(
            host,
            &label,
            &self.settings.scp_binary,
            result,
            timeout,
            Some(SSH_CONNECT_EXIT),
        )?;
        Ok(())
    }
}
