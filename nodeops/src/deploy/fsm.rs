//! Finite State Machine for node deployment

use serde::{Deserialize, Serialize};

use crate::models::deployment::Phase;

/// Deployment state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeploymentState {
    /// Nothing has run yet
    Pending,

    /// Artifact built for the target OS/architecture
    Built,

    PreflightChecked,

    ServiceStopped,

    BackedUp,

    Uploaded,

    Initialized,

    PeersConfigured,

    Started,

    /// Node observed producing blocks
    Verified,

    Failed { phase: Phase, reason: String },

    /// Automated resolution gave up; the operator must supply a value and re-run
    AwaitingOperatorInput { phase: Phase, reason: String },

    /// Operator interrupt honored before `before` started
    Cancelled { before: Phase },
}

impl DeploymentState {
    /// State reached once `phase` completes
    pub fn reached_by(phase: Phase) -> Self {
        match phase {
            Phase::Build => DeploymentState::Built,
            Phase::PreflightCheck => DeploymentState::PreflightChecked,
            Phase::StopService => DeploymentState::ServiceStopped,
            Phase::BackupData => DeploymentState::BackedUp,
            Phase::UploadArtifacts => DeploymentState::Uploaded,
            Phase::InitializeConfig => DeploymentState::Initialized,
            Phase::ConfigurePeers => DeploymentState::PeersConfigured,
            Phase::StartService => DeploymentState::Started,
            Phase::VerifyHealth => DeploymentState::Verified,
        }
    }

    /// No further transitions are accepted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Verified
                | DeploymentState::Failed { .. }
                | DeploymentState::AwaitingOperatorInput { .. }
                | DeploymentState::Cancelled { .. }
        )
    }

    /// On the success path (not failed, waiting or cancelled)
    pub fn is_progress(&self) -> bool {
        !matches!(
            self,
            DeploymentState::Failed { .. }
                | DeploymentState::AwaitingOperatorInput { .. }
                | DeploymentState::Cancelled { .. }
        )
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Phase finished, either successfully or as a legitimate skip
    PhaseCompleted(Phase),

    /// Phase failed; the plan halts here
    PhaseFailed(Phase, String),

    /// Phase needs a value only the operator can supply
    InputRequired(Phase, String),

    /// Cancellation observed before the phase started
    Cancel(Phase),
}

impl DeploymentEvent {
    fn phase(&self) -> Phase {
        match self {
            DeploymentEvent::PhaseCompleted(phase)
            | DeploymentEvent::PhaseFailed(phase, _)
            | DeploymentEvent::InputRequired(phase, _)
            | DeploymentEvent::Cancel(phase) => *phase,
        }
    }
}

/// Deployment FSM. Phases are accepted in strictly increasing canonical order.
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    last_completed: Option<Phase>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Pending,
            last_completed: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    /// Last phase that completed
    pub fn last_completed(&self) -> Option<Phase> {
        self.last_completed
    }

    /// Get the failure reason if any
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            DeploymentState::Failed { reason, .. }
            | DeploymentState::AwaitingOperatorInput { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        if self.state.is_terminal() {
            return Err(format!(
                "Invalid transition: {:?} -> {:?}",
                self.state, event
            ));
        }

        let phase = event.phase();
        if let Some(last) = self.last_completed {
            if phase <= last {
                return Err(format!(
                    "Invalid transition: {} after {} is out of order",
                    phase, last
                ));
            }
        }

        self.state = match event {
            DeploymentEvent::PhaseCompleted(phase) => {
                self.last_completed = Some(phase);
                DeploymentState::reached_by(phase)
            }
            DeploymentEvent::PhaseFailed(phase, reason) => DeploymentState::Failed { phase, reason },
            DeploymentEvent::InputRequired(phase, reason) => {
                DeploymentState::AwaitingOperatorInput { phase, reason }
            }
            DeploymentEvent::Cancel(phase) => DeploymentState::Cancelled { before: phase },
        };
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
