//! FSM unit tests

use nodeops::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use nodeops::models::deployment::Phase;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), &DeploymentState::Pending);
    assert!(fsm.error().is_none());
    assert!(fsm.last_completed().is_none());
}

#[test]
fn test_fsm_partial_plan_flow() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::PhaseCompleted(Phase::StopService)).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::ServiceStopped);

    fsm.process(DeploymentEvent::PhaseCompleted(Phase::StartService)).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Started);
    assert!(!fsm.state().is_terminal());
    assert!(fsm.state().is_progress());

    fsm.process(DeploymentEvent::PhaseCompleted(Phase::VerifyHealth)).unwrap();
    assert_eq!(fsm.state(), &DeploymentState::Verified);
}

#[test]
fn test_fsm_rejects_out_of_order_phase() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::PhaseCompleted(Phase::BackupData)).unwrap();
    assert!(fsm
        .process(DeploymentEvent::PhaseCompleted(Phase::StopService))
        .is_err());
    assert!(fsm
        .process(DeploymentEvent::PhaseCompleted(Phase::BackupData))
        .is_err());
    assert_eq!(fsm.state(), &DeploymentState::BackedUp);
}

#[test]
fn test_fsm_failed_is_terminal() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::PhaseFailed(
        Phase::InitializeConfig,
        "genesis mismatch".to_string(),
    ))
    .unwrap();

    assert!(fsm.state().is_terminal());
    assert_eq!(fsm.error(), Some("genesis mismatch"));
    assert!(fsm
        .process(DeploymentEvent::PhaseCompleted(Phase::StartService))
        .is_err());
}

#[test]
fn test_fsm_awaiting_operator_input() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::PhaseCompleted(Phase::StopService)).unwrap();
    fsm.process(DeploymentEvent::InputRequired(
        Phase::ConfigurePeers,
        "seed node ID unknown".to_string(),
    ))
    .unwrap();

    assert_eq!(
        fsm.state(),
        &DeploymentState::AwaitingOperatorInput {
            phase: Phase::ConfigurePeers,
            reason: "seed node ID unknown".to_string(),
        }
    );
    assert!(!fsm.state().is_progress());
    assert_eq!(fsm.error(), Some("seed node ID unknown"));
}

#[test]
fn test_fsm_cancel() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::PhaseCompleted(Phase::Build)).unwrap();
    fsm.process(DeploymentEvent::Cancel(Phase::PreflightCheck)).unwrap();

    assert_eq!(
        fsm.state(),
        &DeploymentState::Cancelled {
            before: Phase::PreflightCheck
        }
    );
    assert_eq!(fsm.last_completed(), Some(Phase::Build));
    assert!(fsm.process(DeploymentEvent::Cancel(Phase::StopService)).is_err());
}

#[test]
fn test_state_serialization() {
    let state = DeploymentState::Failed {
        phase: Phase::StopService,
        reason: "Access denied".to_string(),
    };
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["state"], "failed");
    assert_eq!(json["phase"], "stop-service");

    let back: DeploymentState = serde_json::from_value(json).unwrap();
    assert_eq!(back, state);

    let json = serde_json::to_value(DeploymentState::PeersConfigured).unwrap();
    assert_eq!(json["state"], "peers_configured");
}
