//! Deployment executor: drives one node through a plan's phases

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{watch, OnceCell};
use tracing::{error, info, warn};

use crate::deploy::builder::{artifact_name, ArtifactBuilder};
use crate::deploy::commands;
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::genesis::GenesisFingerprint;
use crate::deploy::peers::{merge_peers, parse_persistent_peers, peer_entry, resolve_seed_id};
use crate::deploy::template::{render_edit_script, role_edits, toml_string, ConfigEdit, ConfigFile};
use crate::errors::OpsError;
use crate::health::evaluator::check_health;
use crate::health::probe::StatusProbe;
use crate::models::deployment::{DeploymentLog, Phase, PhaseResult, PhaseStatus, Rollback};
use crate::models::plan::DeploymentPlan;
use crate::models::status::Classification;
use crate::models::target::{NodeTarget, Role};
use crate::remote::{CommandOutput, RemoteChannel};
use crate::storage::runs::RunStore;
use crate::storage::settings::{NetworkSettings, ServiceMode, SshSettings};
use crate::utils::generate_uuid;

/// Result of a phase that did not fail
#[derive(Debug)]
struct PhaseOutput {
    status: PhaseStatus,
    detail: String,
}

impl PhaseOutput {
    fn done(detail: impl Into<String>) -> Self {
        Self {
            status: PhaseStatus::Success,
            detail: detail.into(),
        }
    }

    fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: PhaseStatus::Skipped,
            detail: detail.into(),
        }
    }
}

/// Per-run context handed to every phase
struct Run<'a> {
    run_id: String,
    target: &'a NodeTarget,
    plan: &'a DeploymentPlan,
    /// Network settings with this node's home, staging dir and service
    network: NetworkSettings,
}

/// Deploys nodes through a remote channel.
///
/// One artifact is built per deployer and shared by every target it deploys.
/// A failed build is remembered too, so targets that share a deployer
/// report the same build failure instead of rebuilding.
pub struct Deployer {
    channel: Arc<dyn RemoteChannel>,
    probe: Arc<dyn StatusProbe>,
    builder: Arc<dyn ArtifactBuilder>,
    connect_timeout: Duration,
    command_timeout: Duration,
    build_dir: PathBuf,
    artifact: OnceCell<Result<PathBuf, String>>,
    run_store: Option<RunStore>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Deployer {
    pub fn new(
        channel: Arc<dyn RemoteChannel>,
        probe: Arc<dyn StatusProbe>,
        builder: Arc<dyn ArtifactBuilder>,
        ssh: &SshSettings,
        build_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            channel,
            probe,
            builder,
            connect_timeout: ssh.connect_timeout(),
            command_timeout: ssh.command_timeout(),
            build_dir: build_dir.into(),
            artifact: OnceCell::new(),
            run_store: None,
            cancel: None,
        }
    }

    /// Persist every log to `store` after each phase
    pub fn with_run_store(mut self, store: RunStore) -> Self {
        self.run_store = Some(store);
        self
    }

    /// Stop before the next phase once `cancel` becomes true
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    async fn persist(&self, log: &DeploymentLog) {
        if let Some(store) = &self.run_store {
            if let Err(e) = store.save(log).await {
                warn!("Failed to persist run {}: {}", log.run_id, e);
            }
        }
    }

    /// Deploy several independent targets concurrently, one log each
    pub async fn deploy_many(&self, targets: &[NodeTarget], plan: &DeploymentPlan) -> Vec<DeploymentLog> {
        join_all(targets.iter().map(|target| self.deploy(target, plan))).await
    }

    /// Run `plan` against `target`, halting at the first failed phase.
    ///
    /// The returned log holds one entry per attempted phase; later phases
    /// are never attempted after a failure.
    pub async fn deploy(&self, target: &NodeTarget, plan: &DeploymentPlan) -> DeploymentLog {
        let run = Run {
            run_id: generate_uuid(),
            target,
            plan,
            network: commands::for_node(&plan.network, target),
        };
        let mut log = DeploymentLog::new(
            run.run_id.clone(),
            target.clone(),
            plan.contains(Phase::VerifyHealth),
        );
        let mut fsm = DeploymentFsm::new();

        info!("[{}] Deploying as {} (run {})", target, target.role, run.run_id);
        self.persist(&log).await;

        for &phase in plan.phases() {
            if self.is_cancelled() {
                warn!("[{}] Cancelled before {}", target, phase);
                transition(&mut fsm, DeploymentEvent::Cancel(phase));
                break;
            }

            info!("[{}] {}", target, phase);
            let halted = match self.run_phase(phase, &run).await {
                Ok(output) => {
                    info!("[{}] {} {:?}: {}", target, phase, output.status, output.detail);
                    transition(&mut fsm, DeploymentEvent::PhaseCompleted(phase));
                    log.append(PhaseResult::new(phase, output.status, output.detail));
                    false
                }
                Err(OpsError::OperatorInputRequired(reason)) => {
                    warn!("[{}] {} needs operator input: {}", target, phase, reason);
                    transition(&mut fsm, DeploymentEvent::InputRequired(phase, reason.clone()));
                    log.append(PhaseResult::new(phase, PhaseStatus::Failed, reason));
                    true
                }
                Err(e) => {
                    error!("[{}] {} failed: {}", target, phase, e);
                    let detail = failure_detail(phase, &e);
                    transition(&mut fsm, DeploymentEvent::PhaseFailed(phase, e.to_string()));
                    log.append(PhaseResult::new(phase, PhaseStatus::Failed, detail));
                    true
                }
            };

            log.final_state = fsm.state().clone();
            self.persist(&log).await;
            if halted {
                break;
            }
        }

        log.finish(fsm.state().clone());
        self.persist(&log).await;
        info!("[{}] Finished in state {:?}", target, log.final_state);
        log
    }

    async fn run_phase(&self, phase: Phase, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        match phase {
            Phase::Build => self.build(run).await,
            Phase::PreflightCheck => self.preflight(run).await,
            Phase::StopService => self.stop_service(run).await,
            Phase::BackupData => self.backup(run).await,
            Phase::UploadArtifacts => self.upload(run).await,
            Phase::InitializeConfig => self.initialize(run).await,
            Phase::ConfigurePeers => self.configure_peers(run).await,
            Phase::StartService => self.start_service(run).await,
            Phase::VerifyHealth => self.verify(run).await,
        }
    }

    async fn exec(&self, target: &NodeTarget, command: &str) -> Result<CommandOutput, OpsError> {
        self.channel
            .execute(&target.host, &target.user, command, self.command_timeout)
            .await
    }

    /// Binary to upload: prebuilt, built this session, or left in the build
    /// directory by an earlier run
    async fn artifact_path(&self, plan: &DeploymentPlan) -> Option<PathBuf> {
        if let Some(prebuilt) = &plan.build.prebuilt_binary {
            return Some(prebuilt.clone());
        }
        if let Some(Ok(built)) = self.artifact.get() {
            return Some(built.clone());
        }
        let previous = self
            .build_dir
            .join(artifact_name(&plan.network.daemon, &plan.build));
        match tokio::fs::try_exists(&previous).await {
            Ok(true) => Some(previous),
            _ => None,
        }
    }

    async fn build(&self, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        let plan = run.plan;
        if let Some(prebuilt) = &plan.build.prebuilt_binary {
            return Ok(PhaseOutput::skipped(format!(
                "using prebuilt binary {}",
                prebuilt.display()
            )));
        }

        let built = self
            .artifact
            .get_or_init(|| async {
                self.builder
                    .build(&plan.build, &plan.network.daemon, &self.build_dir)
                    .await
                    .map_err(|e| match e {
                        OpsError::BuildError(reason) => reason,
                        other => other.to_string(),
                    })
            })
            .await;
        match built {
            Ok(path) => Ok(PhaseOutput::done(format!("built {}", path.display()))),
            Err(reason) => Err(OpsError::BuildError(reason.clone())),
        }
    }

    async fn preflight(&self, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        let (target, plan) = (run.target, run.plan);

        let fingerprint = GenesisFingerprint::read_file(&plan.network.genesis_path).await?;

        if plan.contains(Phase::UploadArtifacts) && self.artifact_path(plan).await.is_none() {
            return Err(OpsError::ConfigMissing(format!(
                "no {} binary to upload; include the build phase or set build.prebuilt_binary",
                plan.network.daemon
            )));
        }

        self.channel
            .execute(&target.host, &target.user, commands::REACHABILITY, self.connect_timeout)
            .await
            .map_err(|e| match e {
                OpsError::Timeout { host, timeout, .. } => OpsError::ConnectError {
                    host,
                    reason: format!("no response within {:?}", timeout),
                },
                other => other,
            })?;

        let uname = self.exec(target, commands::UNAME).await?;
        let platform = uname.stdout.trim().to_string();
        match commands::parse_uname(&platform) {
            Some((os, arch)) if os != plan.build.target_os || arch != plan.build.target_arch => {
                return Err(OpsError::ConfigMismatch(format!(
                    "{} is {}/{} but the artifact targets {}/{}",
                    target, os, arch, plan.build.target_os, plan.build.target_arch
                )));
            }
            Some(_) => {}
            None => warn!("[{}] Unrecognized platform {:?}", target, platform),
        }

        Ok(PhaseOutput::done(format!(
            "reachable ({}), genesis {}",
            platform, fingerprint
        )))
    }

    async fn stop_service(&self, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        let network = &run.network;
        match self.exec(run.target, &commands::stop_service(network)).await {
            Ok(_) => Ok(PhaseOutput::done("service stopped")),
            Err(OpsError::CommandError {
                exit_code, stderr, ..
            }) if already_stopped(network.service_mode, exit_code, &stderr) => {
                Ok(PhaseOutput::done("already stopped"))
            }
            Err(e) => Err(e),
        }
    }

    async fn backup(&self, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        let network = &run.network;
        match self.exec(run.target, &commands::data_dir_exists(network)).await {
            Ok(_) => {}
            Err(OpsError::CommandError { exit_code: 1, .. }) => {
                return Ok(PhaseOutput::skipped("nothing to back up"));
            }
            Err(e) => return Err(e),
        }

        let name = commands::backup_name(network, Utc::now(), &run.run_id);
        self.exec(run.target, &commands::backup(network, &name)).await?;
        Ok(PhaseOutput::done(format!(
            "backed up to {}",
            commands::backup_path(network, &name)
        )))
    }

    async fn upload(&self, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        let (target, plan) = (run.target, run.plan);
        let network = &run.network;

        let artifact = self.artifact_path(plan).await.ok_or_else(|| {
            OpsError::ConfigMissing(format!("no {} binary to upload", network.daemon))
        })?;

        self.exec(target, &commands::make_staging_dir(network)).await?;
        self.channel
            .upload(
                &target.host,
                &target.user,
                &artifact,
                &commands::staged(network, &network.daemon),
            )
            .await?;
        self.channel
            .upload(
                &target.host,
                &target.user,
                &network.genesis_path,
                &commands::staged(network, "genesis.json"),
            )
            .await?;
        self.exec(target, &commands::install_binary(network)).await?;

        if network.service_mode == ServiceMode::Systemd {
            self.exec(target, &commands::install_unit(network, &target.user))
                .await?;
        }

        Ok(PhaseOutput::done(format!(
            "installed {}",
            commands::daemon_path(network)
        )))
    }

    async fn initialize(&self, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        let (target, network) = (run.target, &run.network);

        let expected = GenesisFingerprint::read_file(&network.genesis_path).await?;

        self.exec(target, &commands::init_node(network, &target.moniker()))
            .await?;
        self.exec(target, &commands::install_genesis(network)).await?;

        let edits = role_edits(target.role, target, network);
        self.exec(target, &render_edit_script(&network.node_home, &edits))
            .await?;

        let output = self.exec(target, &commands::genesis_checksum(network)).await?;
        let installed = GenesisFingerprint::parse_sha256sum_output(&output.stdout)?;
        if installed != expected {
            return Err(OpsError::ConfigMismatch(format!(
                "genesis on {} is {}, expected {}",
                target, installed, expected
            )));
        }

        Ok(PhaseOutput::done(format!(
            "initialized {} as {}, genesis {}",
            target.moniker(),
            target.role,
            expected
        )))
    }

    async fn configure_peers(&self, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        let (target, plan) = (run.target, run.plan);
        if target.role == Role::Master {
            return Ok(PhaseOutput::skipped("seed node keeps no persistent peers"));
        }

        let node_id = resolve_seed_id(
            self.probe.as_ref(),
            &plan.seed,
            &plan.peer_resolution,
            tokio::time::sleep,
        )
        .await?;
        let entry = peer_entry(&node_id, &plan.seed);

        let output = self
            .exec(target, &commands::read_persistent_peers(&run.network))
            .await?;
        let existing = parse_persistent_peers(&output.stdout);
        let merged = merge_peers(&existing, &entry);
        if merged == existing {
            return Ok(PhaseOutput::done(format!("{} already configured", entry)));
        }

        let edit = ConfigEdit::new(
            ConfigFile::Config,
            Some("p2p"),
            "persistent_peers",
            toml_string(&merged),
        );
        self.exec(target, &render_edit_script(&run.network.node_home, &[edit]))
            .await?;
        Ok(PhaseOutput::done(format!("persistent_peers = {}", merged)))
    }

    async fn start_service(&self, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        self.exec(run.target, &commands::start_service(&run.network))
            .await?;
        Ok(PhaseOutput::done("service started"))
    }

    async fn verify(&self, run: &Run<'_>) -> Result<PhaseOutput, OpsError> {
        let (target, plan) = (run.target, run.plan);
        let verdict = check_health(self.probe.as_ref(), target, plan.verify_window).await;

        if let Some(sample) = &verdict.latest {
            if sample.chain_id != plan.network.chain_id {
                return Err(OpsError::ConfigMismatch(format!(
                    "{} reports chain {:?}, expected {:?}",
                    target, sample.chain_id, plan.network.chain_id
                )));
            }
        }

        let diagnosis = verdict.diagnosis.clone().unwrap_or_default();
        match verdict.classification {
            Classification::Active => Ok(PhaseOutput::done(format!(
                "{} blocks in {:.0}s ({:.1}/min)",
                verdict.blocks_produced, verdict.elapsed_seconds, verdict.rate_per_minute
            ))),
            Classification::Stalled => Err(OpsError::Unhealthy(diagnosis)),
            Classification::Regressed => Err(OpsError::Regressed {
                from: verdict.start_height.unwrap_or_default(),
                to: verdict.end_height.unwrap_or_default(),
            }),
            Classification::Unreachable => Err(OpsError::Unreachable(diagnosis)),
        }
    }
}

fn transition(fsm: &mut DeploymentFsm, event: DeploymentEvent) {
    if let Err(e) = fsm.process(event) {
        error!("{}", e);
    }
}

/// `systemctl stop` on an unknown unit and `pkill` with no match both mean
/// there is nothing to stop
fn already_stopped(mode: ServiceMode, exit_code: i32, stderr: &str) -> bool {
    match mode {
        ServiceMode::Systemd => {
            exit_code == commands::SYSTEMCTL_NOT_LOADED_EXIT || stderr.contains("not loaded")
        }
        ServiceMode::Process => exit_code == commands::PKILL_NO_MATCH_EXIT,
    }
}

fn failure_detail(phase: Phase, err: &OpsError) -> String {
    match phase.rollback() {
        Rollback::None => err.to_string(),
        rollback => format!("{} (rollback: {})", err, rollback.description()),
    }
}
