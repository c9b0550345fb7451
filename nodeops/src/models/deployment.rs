//! Deployment models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentState;
use crate::models::outcome::Outcome;
use crate::models::target::NodeTarget;

/// One step of a deployment plan, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Build,
    PreflightCheck,
    StopService,
    BackupData,
    UploadArtifacts,
    InitializeConfig,
    ConfigurePeers,
    StartService,
    VerifyHealth,
}

/// Advisory rollback for a phase. Never executed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rollback {
    None,
    RestartService,
    RestoreBackup,
    StopService,
}

impl Rollback {
    pub fn description(&self) -> &'static str {
        match self {
            Rollback::None => "no rollback needed",
            Rollback::RestartService => "reinstall the previous release and restart the service",
            Rollback::RestoreBackup => {
                "stop the node and restore the node home from this run's backup directory"
            }
            Rollback::StopService => "stop the node before retrying",
        }
    }
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::Build,
        Phase::PreflightCheck,
        Phase::StopService,
        Phase::BackupData,
        Phase::UploadArtifacts,
        Phase::InitializeConfig,
        Phase::ConfigurePeers,
        Phase::StartService,
        Phase::VerifyHealth,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::PreflightCheck => "preflight-check",
            Phase::StopService => "stop-service",
            Phase::BackupData => "backup-data",
            Phase::UploadArtifacts => "upload-artifacts",
            Phase::InitializeConfig => "initialize-config",
            Phase::ConfigurePeers => "configure-peers",
            Phase::StartService => "start-service",
            Phase::VerifyHealth => "verify-health",
        }
    }

    /// Safe to re-run without side effects beyond restoring the desired end state.
    /// Backups are not: every run leaves exactly one new backup directory.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Phase::BackupData)
    }

    /// Overwrites node state and must follow a backup
    pub fn is_destructive(&self) -> bool {
        matches!(self, Phase::InitializeConfig)
    }

    pub fn rollback(&self) -> Rollback {
        match self {
            Phase::Build | Phase::PreflightCheck | Phase::BackupData => Rollback::None,
            Phase::StopService | Phase::UploadArtifacts => Rollback::RestartService,
            Phase::InitializeConfig | Phase::ConfigurePeers => Rollback::RestoreBackup,
            Phase::StartService | Phase::VerifyHealth => Rollback::StopService,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Phase::ALL
            .into_iter()
            .find(|phase| phase.name() == wanted)
            .ok_or_else(|| format!("Invalid phase: {}", s))
    }
}

/// Status of a finished phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Success,
    Failed,
    Skipped,
}

/// Outcome of one phase, appended to the deployment log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl PhaseResult {
    pub fn new(phase: Phase, status: PhaseStatus, detail: impl Into<String>) -> Self {
        Self {
            phase,
            status,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only record of one deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentLog {
    /// Unique run ID
    pub run_id: String,

    pub target: NodeTarget,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    pub entries: Vec<PhaseResult>,

    pub final_state: DeploymentState,

    /// Whether the plan included VerifyHealth
    pub verification_required: bool,
}

impl DeploymentLog {
    pub fn new(run_id: impl Into<String>, target: NodeTarget, verification_required: bool) -> Self {
        Self {
            run_id: run_id.into(),
            target,
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
            final_state: DeploymentState::Pending,
            verification_required,
        }
    }

    pub fn append(&mut self, result: PhaseResult) {
        self.entries.push(result);
    }

    pub fn finish(&mut self, state: DeploymentState) {
        self.final_state = state;
        self.finished_at = Some(Utc::now());
    }

    /// Latest entry recorded for a phase
    pub fn entry(&self, phase: Phase) -> Option<&PhaseResult> {
        self.entries.iter().rev().find(|e| e.phase == phase)
    }

    /// Whether a phase completed (successfully or as a legitimate skip)
    pub fn completed(&self, phase: Phase) -> bool {
        self.entry(phase)
            .map(|e| e.status != PhaseStatus::Failed)
            .unwrap_or(false)
    }

    pub fn failed_phase(&self) -> Option<Phase> {
        self.entries
            .iter()
            .find(|e| e.status == PhaseStatus::Failed)
            .map(|e| e.phase)
    }

    /// Manual remediation advice for a failed run
    pub fn rollback_hint(&self) -> Option<String> {
        let phase = self.failed_phase()?;
        let rollback = phase.rollback();
        if rollback == Rollback::None {
            return None;
        }
        Some(format!("{} failed: {}", phase, rollback.description()))
    }

    pub fn succeeded(&self) -> bool {
        match &self.final_state {
            DeploymentState::Verified => true,
            state if !self.verification_required => state.is_progress() && self.finished_at.is_some(),
            _ => false,
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.succeeded() {
            return Outcome::Success;
        }
        match self.final_state {
            DeploymentState::Cancelled { .. } => Outcome::SoftFailure,
            _ => Outcome::HardFailure,
        }
    }
}
