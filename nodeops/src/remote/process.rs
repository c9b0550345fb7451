//! Bounded subprocess execution shared by the channels and the builder

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::info;

use crate::errors::OpsError;
use crate::remote::CommandOutput;
use crate::utils::tail;

/// Characters of stderr kept in error payloads
const STDERR_TAIL: usize = 2000;

/// Why a subprocess did not produce an exit status
#[derive(Debug)]
pub enum RunError {
    /// The program could not be started
    Spawn(std::io::Error),

    TimedOut,

    Io(std::io::Error),
}

/// Run `command` to completion or until `timeout`, collecting its output.
///
/// With a `stream_label`, each line is also logged as it arrives. On timeout
/// the child is killed.
pub async fn run_command(
    mut command: Command,
    timeout: Duration,
    stream_label: Option<&str>,
) -> Result<CommandOutput, RunError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(RunError::Spawn)?;

    let label = stream_label.map(str::to_string);
    let stdout_task = tokio::spawn(collect_lines(child.stdout.take(), label.clone(), "stdout"));
    let stderr_task = tokio::spawn(collect_lines(child.stderr.take(), label, "stderr"));

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status.map_err(RunError::Io)?,
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunError::TimedOut);
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code: status.code().unwrap_or(-1),
    })
}

async fn collect_lines<R>(reader: Option<R>, label: Option<String>, stream: &'static str) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(label) = &label {
            info!(target: "nodeops::remote", host = %label, stream = stream, "{}", line);
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    collected
}

/// Map a finished run onto the channel error taxonomy.
///
/// `connect_exit` is the exit code the transport itself uses for connection
/// failures (255 for ssh).
pub fn check_output(
    host: &str,
    command: &str,
    program: &str,
    result: Result<CommandOutput, RunError>,
    timeout: Duration,
    connect_exit: Option<i32>,
) -> Result<CommandOutput, OpsError> {
    let output = match result {
        Ok(output) => output,
        Err(RunError::Spawn(e)) => {
            return Err(OpsError::ConfigError(format!(
                "failed to run {}: {}",
                program, e
            )))
        }
        Err(RunError::TimedOut) => {
            return Err(OpsError::Timeout {
                host: host.to_string(),
                command: command.to_string(),
                timeout,
            })
        }
        Err(RunError::Io(e)) => return Err(OpsError::IoError(e)),
    };

    if output.exit_code == 0 {
        return Ok(output);
    }

    if connect_exit == Some(output.exit_code) {
        return Err(OpsError::ConnectError {
            host: host.to_string(),
            reason: tail(&output.stderr, STDERR_TAIL),
        });
    }

    Err(OpsError::CommandError {
        host: host.to_string(),
        command: command.to_string(),
        exit_code: output.exit_code,
        stderr: tail(&output.stderr, STDERR_TAIL),
    })
}
