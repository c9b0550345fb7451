//! Node deployment: build, install, configure, start and verify

pub mod builder;
pub mod commands;
pub mod executor;
pub mod fsm;
pub mod genesis;
pub mod peers;
pub mod template;

pub use builder::{ArtifactBuilder, GoBuilder};
pub use executor::Deployer;
pub use fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
pub use genesis::GenesisFingerprint;
