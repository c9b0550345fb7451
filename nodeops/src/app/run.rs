//! Command dispatch

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app::cli::{
    Cli, Command, DeployArgs, FingerprintArgs, FleetArgs, HealthArgs, NodeSelection, RunsArgs,
    StatusArgs,
};
use crate::app::render;
use crate::deploy::builder::GoBuilder;
use crate::deploy::executor::Deployer;
use crate::deploy::genesis::GenesisFingerprint;
use crate::diagnostic;
use crate::errors::OpsError;
use crate::fleet::FleetAggregator;
use crate::health::evaluator::check_health_with_retries;
use crate::health::probe::{CometRpcProbe, StatusProbe};
use crate::models::deployment::{DeploymentLog, Phase};
use crate::models::fleet::FleetReport;
use crate::models::outcome::Outcome;
use crate::models::plan::DeploymentPlan;
use crate::models::target::{NodeTarget, Role};
use crate::remote::{LocalChannel, RemoteChannel, SshChannel};
use crate::storage::layout::StorageLayout;
use crate::storage::runs::RunStore;
use crate::storage::settings::{HealthSettings, Settings};
use crate::utils::{version_info, CooldownOptions};
use crate::workers::monitor;

/// Everything a command needs besides its arguments
pub struct Context {
    pub settings: Settings,
    pub layout: StorageLayout,
    pub json: bool,
    pub shutdown: watch::Receiver<bool>,
}

impl Context {
    pub fn new(settings: Settings, json: bool, shutdown: watch::Receiver<bool>) -> Self {
        let layout = settings
            .work_dir
            .clone()
            .map(StorageLayout::new)
            .unwrap_or_default();
        Self {
            settings,
            layout,
            json,
            shutdown,
        }
    }

    fn probe(&self, timeout: Duration) -> Result<Arc<dyn StatusProbe>, OpsError> {
        Ok(Arc::new(CometRpcProbe::new(timeout)?))
    }

    fn run_store(&self) -> RunStore {
        RunStore::new(self.layout.runs_dir())
    }
}

/// Run the parsed command and return its outcome
pub async fn run(cli: Cli, ctx: Context) -> Result<Outcome, OpsError> {
    match cli.command {
        Command::Deploy(args) => deploy(&ctx, args).await,
        Command::Health(args) => health(&ctx, args).await,
        Command::Status(args) => status(&ctx, args).await,
        Command::Fleet(args) => fleet(&ctx, args).await,
        Command::Fingerprint(args) => fingerprint(&ctx, args).await,
        Command::Runs(args) => runs(&ctx, args).await,
        Command::Diagnostic => {
            let diag = diagnostic::collect(&ctx.settings);
            if ctx.json {
                render::print_json(&diag)?;
            } else {
                print!("{}", render::diagnostic(&diag));
            }
            if diag.missing_tools().next().is_some() {
                Ok(Outcome::SoftFailure)
            } else {
                Ok(Outcome::Success)
            }
        }
        Command::Version => {
            let info = version_info();
            if ctx.json {
                render::print_json(&info)?;
            } else {
                println!("{}", render::version(&info));
            }
            Ok(Outcome::Success)
        }
    }
}

/// Resolve a node selection against the inventory
pub fn select_targets(settings: &Settings, selection: &NodeSelection) -> Result<Vec<NodeTarget>, OpsError> {
    if selection.all || selection.nodes.is_empty() {
        if settings.nodes.is_empty() {
            return Err(OpsError::ConfigError("the node inventory is empty".to_string()));
        }
        return Ok(settings.nodes.clone());
    }

    selection
        .nodes
        .iter()
        .map(|name| {
            settings
                .find_node(name)
                .cloned()
                .ok_or_else(|| OpsError::NotFound(format!("node {:?} is not in the inventory", name)))
        })
        .collect()
}

fn worst<I: IntoIterator<Item = Outcome>>(outcomes: I) -> Outcome {
    outcomes.into_iter().fold(Outcome::Success, Outcome::worst)
}

async fn deploy(ctx: &Context, args: DeployArgs) -> Result<Outcome, OpsError> {
    let mut settings = ctx.settings.clone();
    if let Some(seed_id) = args.seed_id {
        settings.seed.node_id = Some(seed_id);
    }
    if let Some(window) = args.window {
        settings.health.window_secs = window;
    }

    let mut phases = if args.phases.is_empty() {
        DeploymentPlan::full_phases()
    } else {
        args.phases
    };
    if args.skip_build {
        phases.retain(|phase| *phase != Phase::Build);
    }
    let plan = DeploymentPlan::from_settings(&settings, phases)?;
    let targets = select_targets(&settings, &args.selection)?;

    ctx.layout.setup().await?;

    let channel: Arc<dyn RemoteChannel> = if args.local {
        Arc::new(LocalChannel::new(settings.ssh.stream_output))
    } else {
        Arc::new(SshChannel::new(settings.ssh.clone()))
    };
    let deployer = Deployer::new(
        channel,
        ctx.probe(settings.health.probe_timeout())?,
        Arc::new(GoBuilder::new(settings.ssh.stream_output)),
        &settings.ssh,
        ctx.layout.build_dir(),
    )
    .with_run_store(ctx.run_store())
    .with_cancel(ctx.shutdown.clone());

    // The seed goes first so the other nodes can resolve its node ID
    let (seeds, others): (Vec<NodeTarget>, Vec<NodeTarget>) =
        targets.into_iter().partition(|t| t.role == Role::Master);

    let mut logs: Vec<DeploymentLog> = deployer.deploy_many(&seeds, &plan).await;
    if logs.iter().all(|log| log.succeeded()) {
        logs.extend(deployer.deploy_many(&others, &plan).await);
    } else if !others.is_empty() {
        warn!("Seed deployment failed; {} other nodes not deployed", others.len());
    }

    if ctx.json {
        render::print_json(&logs)?;
    } else {
        for log in &logs {
            print!("{}", render::deployment(log));
        }
    }

    let outcome = worst(logs.iter().map(DeploymentLog::outcome));
    if logs.len() < seeds.len() + others.len() {
        return Ok(Outcome::HardFailure);
    }
    Ok(outcome)
}

async fn health(ctx: &Context, args: HealthArgs) -> Result<Outcome, OpsError> {
    let settings = &ctx.settings;
    let targets = select_targets(settings, &args.selection)?;
    let window = health_window(args.window, &settings.health)?;
    let probe = ctx.probe(settings.health.probe_timeout())?;
    let cooldown = CooldownOptions::default();

    info!("Checking {} nodes over {:?}", targets.len(), window);
    let verdicts = join_all(targets.iter().map(|target| {
        check_health_with_retries(
            probe.as_ref(),
            target,
            window,
            args.retries,
            &cooldown,
            tokio::time::sleep,
        )
    }))
    .await;

    if ctx.json {
        render::print_json(&verdicts)?;
    } else {
        for verdict in &verdicts {
            println!("{}", render::verdict(verdict));
        }
    }
    Ok(worst(verdicts.iter().map(|v| v.outcome())))
}

/// Observation window from `--window` or settings; zero is rejected
fn health_window(seconds: Option<u64>, health: &HealthSettings) -> Result<Duration, OpsError> {
    let window = seconds.map(Duration::from_secs).unwrap_or_else(|| health.window());
    if window.is_zero() {
        return Err(OpsError::InvalidPlan(
            "health window must be greater than zero".to_string(),
        ));
    }
    Ok(window)
}

async fn status(ctx: &Context, args: StatusArgs) -> Result<Outcome, OpsError> {
    let settings = &ctx.settings;
    let targets = select_targets(settings, &args.selection)?;
    let probe = ctx.probe(settings.health.probe_timeout())?;

    let samples: Vec<Result<_, OpsError>> = join_all(
        targets
            .iter()
            .map(|target| async { probe.sample(target).await.map_err(OpsError::from) }),
    )
    .await;

    let validators = if args.validators {
        let source = targets
            .iter()
            .zip(&samples)
            .filter(|(_, sample)| sample.is_ok())
            .map(|(target, _)| target)
            .min_by_key(|target| target.role != Role::Master);
        match source {
            Some(target) => Some(probe.validators(target).await?),
            None => None,
        }
    } else {
        None
    };

    if ctx.json {
        let nodes: Vec<serde_json::Value> = targets
            .iter()
            .zip(&samples)
            .map(|(target, sample)| match sample {
                Ok(sample) => serde_json::json!({ "node": target.key(), "host": target.host, "sample": sample }),
                Err(e) => serde_json::json!({ "node": target.key(), "host": target.host, "error": e.to_string() }),
            })
            .collect();
        render::print_json(&serde_json::json!({ "nodes": nodes, "validators": validators }))?;
    } else {
        for (target, sample) in targets.iter().zip(&samples) {
            println!("{}", render::sample(target, sample));
        }
        if let Some(validators) = &validators {
            print!("{}", render::validators(validators));
        }
    }

    if samples.iter().any(|s| s.is_err()) {
        Ok(Outcome::SoftFailure)
    } else {
        Ok(Outcome::Success)
    }
}

async fn fleet(ctx: &Context, args: FleetArgs) -> Result<Outcome, OpsError> {
    let settings = &ctx.settings;
    let targets = select_targets(settings, &NodeSelection::default())?;
    let aggregator = FleetAggregator::new(
        ctx.probe(Duration::from_secs(settings.fleet.probe_timeout_secs))?,
        settings.fleet.clone(),
    );

    let json = ctx.json;
    let emit = |report: &FleetReport| {
        if json {
            if let Err(e) = render::print_json(report) {
                warn!("Failed to render report: {}", e);
            }
        } else {
            print!("{}", render::fleet(report));
        }
    };

    if !args.watch {
        let report = aggregator.report(&targets).await;
        emit(&report);
        return Ok(report.outcome());
    }

    let options = monitor::Options {
        interval: Duration::from_secs(args.interval.unwrap_or(settings.fleet.interval_secs)),
        max_reports: args.count,
    };
    let mut shutdown = ctx.shutdown.clone();
    let shutdown_signal = Box::pin(async move {
        let _ = shutdown.wait_for(|cancelled| *cancelled).await;
    });

    let mut last = Outcome::Success;
    monitor::run(
        &options,
        &aggregator,
        &targets,
        |report| {
            last = report.outcome();
            emit(report);
        },
        tokio::time::sleep,
        shutdown_signal,
    )
    .await;
    Ok(last)
}

async fn fingerprint(ctx: &Context, args: FingerprintArgs) -> Result<Outcome, OpsError> {
    let fingerprint = GenesisFingerprint::read_file(&args.file).await?;
    let expected = args
        .compare
        .as_deref()
        .map(GenesisFingerprint::from_hex)
        .transpose()?;
    let matches = expected.map(|e| e == fingerprint);

    if ctx.json {
        render::print_json(&serde_json::json!({
            "file": args.file,
            "sha256": fingerprint.to_string(),
            "matches": matches,
        }))?;
    } else {
        println!(
            "{}",
            render::fingerprint(&args.file.display().to_string(), &fingerprint, expected.as_ref())
        );
    }

    match matches {
        Some(false) => Ok(Outcome::HardFailure),
        _ => Ok(Outcome::Success),
    }
}

async fn runs(ctx: &Context, args: RunsArgs) -> Result<Outcome, OpsError> {
    let store = ctx.run_store();
    match args.run_id {
        Some(run_id) => {
            let log = store.load(&run_id).await?;
            if ctx.json {
                render::print_json(&log)?;
            } else {
                print!("{}", render::deployment(&log));
            }
            Ok(log.outcome())
        }
        None => {
            let logs = store.list().await?;
            if ctx.json {
                render::print_json(&logs)?;
            } else {
                print!("{}", render::run_list(&logs));
            }
            Ok(Outcome::Success)
        }
    }
}
