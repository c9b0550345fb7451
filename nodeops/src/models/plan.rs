//! Deployment plan

use std::time::Duration;

use crate::errors::OpsError;
use crate::models::deployment::Phase;
use crate::storage::settings::{
    BuildSettings, NetworkSettings, PeerResolutionSettings, SeedSettings, Settings,
};

/// Ordered phases plus everything they need. Owned by a single run.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    phases: Vec<Phase>,

    pub network: NetworkSettings,

    pub seed: SeedSettings,

    pub build: BuildSettings,

    /// Window for the VerifyHealth phase
    pub verify_window: Duration,

    pub peer_resolution: PeerResolutionSettings,
}

impl DeploymentPlan {
    /// Create a validated plan
    pub fn new(
        phases: Vec<Phase>,
        network: NetworkSettings,
        seed: SeedSettings,
        build: BuildSettings,
        verify_window: Duration,
        peer_resolution: PeerResolutionSettings,
    ) -> Result<Self, OpsError> {
        validate_phases(&phases)?;
        if verify_window.is_zero() {
            return Err(OpsError::InvalidPlan(
                "verification window must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            phases,
            network,
            seed,
            build,
            verify_window,
            peer_resolution,
        })
    }

    /// Plan built from the settings file
    pub fn from_settings(settings: &Settings, phases: Vec<Phase>) -> Result<Self, OpsError> {
        Self::new(
            phases,
            settings.network.clone(),
            settings.seed.clone(),
            settings.build.clone(),
            settings.health.window(),
            settings.peers.clone(),
        )
    }

    /// Every phase, in canonical order
    pub fn full_phases() -> Vec<Phase> {
        Phase::ALL.to_vec()
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn contains(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

fn validate_phases(phases: &[Phase]) -> Result<(), OpsError> {
    if phases.is_empty() {
        return Err(OpsError::InvalidPlan("plan has no phases".to_string()));
    }

    for pair in phases.windows(2) {
        if pair[0] >= pair[1] {
            return Err(OpsError::InvalidPlan(format!(
                "{} cannot run after {}",
                pair[1], pair[0]
            )));
        }
    }

    let has = |phase: Phase| phases.contains(&phase);

    for phase in phases.iter().filter(|p| p.is_destructive()) {
        if !has(Phase::BackupData) {
            return Err(OpsError::InvalidPlan(format!(
                "{} overwrites node state and requires {}",
                phase,
                Phase::BackupData
            )));
        }
    }

    if has(Phase::UploadArtifacts) && !has(Phase::StopService) {
        return Err(OpsError::InvalidPlan(format!(
            "{} requires {} first",
            Phase::UploadArtifacts,
            Phase::StopService
        )));
    }

    Ok(())
}
