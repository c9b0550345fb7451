//! Settings file management

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::OpsError;
use crate::logs::LogLevel;
use crate::models::target::{NodeTarget, Role, DEFAULT_P2P_PORT, DEFAULT_RPC_PORT};

/// nodeops settings, loaded from a JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Local working directory for build artifacts and run logs
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub seed: SeedSettings,

    #[serde(default)]
    pub build: BuildSettings,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub fleet: FleetSettings,

    #[serde(default)]
    pub peers: PeerResolutionSettings,

    /// Node inventory
    #[serde(default)]
    pub nodes: Vec<NodeTarget>,
}

impl Settings {
    /// Load settings from a JSON file
    pub async fn load(path: &Path) -> Result<Self, OpsError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            OpsError::ConfigMissing(format!("settings file {}: {}", path.display(), e))
        })?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    /// Find an inventory node by key, host or moniker
    pub fn find_node(&self, name: &str) -> Option<&NodeTarget> {
        self.nodes
            .iter()
            .find(|n| n.key() == name || n.host == name || n.moniker() == name)
    }
}

/// How the daemon is supervised on the remote host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    #[default]
    Systemd,

    /// Background process started with nohup
    Process,
}

/// Network and daemon layout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_chain_id")]
    pub chain_id: String,

    /// Daemon binary name
    #[serde(default = "default_daemon")]
    pub daemon: String,

    /// Node home on the remote host
    #[serde(default = "default_node_home")]
    pub node_home: String,

    /// Local genesis file shared by every node
    #[serde(default = "default_genesis_path")]
    pub genesis_path: PathBuf,

    /// Remote staging directory for uploads
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Remote directory holding per-run backups
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Remote directory the binary is installed into
    #[serde(default = "default_install_dir")]
    pub install_dir: String,

    #[serde(default)]
    pub service_mode: ServiceMode,

    #[serde(default = "default_daemon")]
    pub service_name: String,

    #[serde(default = "default_min_gas_prices")]
    pub minimum_gas_prices: String,
}

fn default_chain_id() -> String {
    "pokerchain".to_string()
}

fn default_daemon() -> String {
    "pokerchaind".to_string()
}

fn default_node_home() -> String {
    "$HOME/.pokerchain".to_string()
}

fn default_genesis_path() -> PathBuf {
    PathBuf::from("genesis.json")
}

fn default_staging_dir() -> String {
    "/tmp/nodeops".to_string()
}

fn default_backup_dir() -> String {
    "$HOME/pokerchain-backups".to_string()
}

fn default_install_dir() -> String {
    "/usr/local/bin".to_string()
}

fn default_min_gas_prices() -> String {
    "0.01stake".to_string()
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            daemon: default_daemon(),
            node_home: default_node_home(),
            genesis_path: default_genesis_path(),
            staging_dir: default_staging_dir(),
            backup_dir: default_backup_dir(),
            install_dir: default_install_dir(),
            service_mode: ServiceMode::Systemd,
            service_name: default_daemon(),
            minimum_gas_prices: default_min_gas_prices(),
        }
    }
}

/// The designated seed node every other node peers with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSettings {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_seed_p2p_port")]
    pub p2p_port: u16,

    #[serde(default = "default_seed_rpc_port")]
    pub rpc_port: u16,

    /// Operator-supplied node ID; skips automatic resolution
    #[serde(default)]
    pub node_id: Option<String>,
}

fn default_seed_p2p_port() -> u16 {
    DEFAULT_P2P_PORT
}

fn default_seed_rpc_port() -> u16 {
    DEFAULT_RPC_PORT
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            p2p_port: DEFAULT_P2P_PORT,
            rpc_port: DEFAULT_RPC_PORT,
            node_id: None,
        }
    }
}

impl SeedSettings {
    /// Seed as a probe target
    pub fn as_target(&self) -> NodeTarget {
        NodeTarget {
            rpc_port: self.rpc_port,
            p2p_port: self.p2p_port,
            ..NodeTarget::new(self.host.clone(), "root", Role::Master)
        }
    }

    pub fn p2p_address(&self) -> String {
        format!("{}:{}", self.host, self.p2p_port)
    }
}

/// Artifact build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Go toolchain binary
    #[serde(default = "default_go_binary")]
    pub go_binary: String,

    /// Checkout of the chain source
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Go package of the daemon main
    #[serde(default = "default_package")]
    pub package: String,

    #[serde(default = "default_target_os")]
    pub target_os: String,

    #[serde(default = "default_target_arch")]
    pub target_arch: String,

    /// Use this binary instead of building
    #[serde(default)]
    pub prebuilt_binary: Option<PathBuf>,

    #[serde(default = "default_build_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_go_binary() -> String {
    "go".to_string()
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_package() -> String {
    "./cmd/pokerchaind".to_string()
}

fn default_target_os() -> String {
    "linux".to_string()
}

fn default_target_arch() -> String {
    "amd64".to_string()
}

fn default_build_timeout_secs() -> u64 {
    900
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            go_binary: default_go_binary(),
            source_dir: default_source_dir(),
            package: default_package(),
            target_os: default_target_os(),
            target_arch: default_target_arch(),
            prebuilt_binary: None,
            timeout_secs: default_build_timeout_secs(),
        }
    }
}

/// SSH transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,

    #[serde(default = "default_scp_binary")]
    pub scp_binary: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_host_key_checking")]
    pub strict_host_key_checking: String,

    /// Log remote output line by line as it arrives
    #[serde(default)]
    pub stream_output: bool,
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_scp_binary() -> String {
    "scp".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_host_key_checking() -> String {
    "accept-new".to_string()
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            ssh_binary: default_ssh_binary(),
            scp_binary: default_scp_binary(),
            port: default_ssh_port(),
            identity_file: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            strict_host_key_checking: default_host_key_checking(),
            stream_output: false,
        }
    }
}

impl SshSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Single-node health check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Observation window between the two samples
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_window_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl HealthSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Fleet report settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_fleet_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Upper bound for the whole fan-out
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,

    /// Heights at or below this count as "just started"
    #[serde(default = "default_height_threshold")]
    pub height_threshold: u64,

    /// Interval between reports in watch mode
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_max_concurrent() -> usize {
    16
}

fn default_fleet_probe_timeout_secs() -> u64 {
    3
}

fn default_overall_timeout_secs() -> u64 {
    15
}

fn default_height_threshold() -> u64 {
    5
}

fn default_interval_secs() -> u64 {
    30
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            probe_timeout_secs: default_fleet_probe_timeout_secs(),
            overall_timeout_secs: default_overall_timeout_secs(),
            height_threshold: default_height_threshold(),
            interval_secs: default_interval_secs(),
        }
    }
}

/// Seed identity resolution retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerResolutionSettings {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    2000
}

impl Default for PeerResolutionSettings {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}
