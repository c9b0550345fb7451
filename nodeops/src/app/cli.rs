//! Command line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logs::LogLevel;
use crate::models::deployment::Phase;

#[derive(Debug, Parser)]
#[command(
    name = "nodeops",
    version,
    about = "Deploy pokerchaind nodes and verify they produce blocks"
)]
pub struct Cli {
    /// Settings file
    #[arg(long, short, global = true, default_value = "nodeops.json")]
    pub config: PathBuf,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override the configured log level
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build, install and start the daemon on one or more nodes
    Deploy(DeployArgs),

    /// Check that nodes are producing blocks
    Health(HealthArgs),

    /// Show one status sample per node
    Status(StatusArgs),

    /// Summarize every node in the inventory
    Fleet(FleetArgs),

    /// SHA-256 fingerprint of a genesis file
    Fingerprint(FingerprintArgs),

    /// List or show persisted deployment runs
    Runs(RunsArgs),

    /// Check the local toolchain
    Diagnostic,

    /// Print version information
    Version,
}

/// Nodes picked from the inventory
#[derive(Debug, Clone, Default, Args)]
pub struct NodeSelection {
    /// Inventory node by host or moniker; repeatable
    #[arg(long = "node", value_name = "NODE")]
    pub nodes: Vec<String>,

    /// Every node in the inventory
    #[arg(long, conflicts_with = "nodes")]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub selection: NodeSelection,

    /// Phases to run, comma separated in canonical order; all by default
    #[arg(long, value_delimiter = ',')]
    pub phases: Vec<Phase>,

    /// Drop the build phase and reuse an existing artifact
    #[arg(long)]
    pub skip_build: bool,

    /// Seed node ID, skipping automatic resolution
    #[arg(long)]
    pub seed_id: Option<String>,

    /// Verification window in seconds
    #[arg(long)]
    pub window: Option<u64>,

    /// Run commands on this machine instead of over SSH
    #[arg(long)]
    pub local: bool,
}

#[derive(Debug, Args)]
pub struct HealthArgs {
    #[command(flatten)]
    pub selection: NodeSelection,

    /// Observation window in seconds
    #[arg(long)]
    pub window: Option<u64>,

    /// Re-check stalled or unreachable nodes this many times
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub selection: NodeSelection,

    /// Also list the validator set
    #[arg(long)]
    pub validators: bool,
}

#[derive(Debug, Args)]
pub struct FleetArgs {
    /// Repeat the report until interrupted
    #[arg(long)]
    pub watch: bool,

    /// Seconds between reports in watch mode
    #[arg(long)]
    pub interval: Option<u64>,

    /// Stop watching after this many reports
    #[arg(long, requires = "watch")]
    pub count: Option<usize>,
}

#[derive(Debug, Args)]
pub struct FingerprintArgs {
    /// Genesis file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Expected hex digest
    #[arg(long)]
    pub compare: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    /// Show a single run
    pub run_id: Option<String>,
}
