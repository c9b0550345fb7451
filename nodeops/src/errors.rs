//! Error types for nodeops

use std::time::Duration;

use thiserror::Error;

/// Main error type for deployment and health operations
#[derive(Error, Debug)]
pub enum OpsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The artifact failed to compile. Never retried.
    #[error("Build failed: {0}")]
    BuildError(String),

    /// The remote host could not be reached at all.
    #[error("Unreachable target {host}: {reason}")]
    ConnectError { host: String, reason: String },

    /// The remote command ran and exited nonzero.
    #[error("Command failed on {host} (exit {exit_code}): {command}: {stderr}")]
    CommandError {
        host: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Timed out after {timeout:?} on {host}: {command}")]
    Timeout {
        host: String,
        command: String,
        timeout: Duration,
    },

    /// Genesis fingerprint or chain-id disagreement. Always fatal.
    #[error("Configuration mismatch: {0}")]
    ConfigMismatch(String),

    #[error("Missing local configuration: {0}")]
    ConfigMissing(String),

    #[error("Malformed status response: {0}")]
    MalformedResponse(String),

    #[error("Node unreachable: {0}")]
    Unreachable(String),

    /// Node answered but is not producing blocks
    #[error("Node unhealthy: {0}")]
    Unhealthy(String),

    #[error("Block height regressed from {from} to {to}")]
    Regressed { from: u64, to: u64 },

    #[error("Operator input required: {0}")]
    OperatorInputRequired(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid deployment plan: {0}")]
    InvalidPlan(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OpsError {
    /// Whether a caller may retry the operation with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OpsError::ConnectError { .. } | OpsError::Timeout { .. } | OpsError::Unreachable(_)
        )
    }
}

impl From<anyhow::Error> for OpsError {
    fn from(err: anyhow::Error) -> Self {
        OpsError::Internal(err.to_string())
    }
}
