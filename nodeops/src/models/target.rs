//! Node target models

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_P2P_PORT: u16 = 26656;
pub const DEFAULT_RPC_PORT: u16 = 26657;
pub const DEFAULT_API_PORT: u16 = 1317;

/// Role a node plays in the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Seed node; every other node peers with it
    Master,

    /// Non-validating full node serving the API
    Sync,

    /// Block-signing validator
    Validator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Master => "master",
            Role::Sync => "sync",
            Role::Validator => "validator",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "master" | "seed" => Ok(Role::Master),
            "sync" | "full" => Ok(Role::Sync),
            "validator" => Ok(Role::Validator),
            _ => Err(format!("Invalid node role: {}", s)),
        }
    }
}

/// One deployable node. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTarget {
    /// Host name or IP address
    pub host: String,

    /// Remote login user
    #[serde(default = "default_user")]
    pub user: String,

    pub role: Role,

    #[serde(default = "default_p2p_port")]
    pub p2p_port: u16,

    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Instance name, for hosts that run more than one node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_p2p_port() -> u16 {
    DEFAULT_P2P_PORT
}

fn default_rpc_port() -> u16 {
    DEFAULT_RPC_PORT
}

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

impl NodeTarget {
    /// Create a target with the daemon's default ports
    pub fn new(host: impl Into<String>, user: impl Into<String>, role: Role) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            role,
            p2p_port: DEFAULT_P2P_PORT,
            rpc_port: DEFAULT_RPC_PORT,
            api_port: DEFAULT_API_PORT,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Identity of the node within an inventory: the instance name if set,
    /// else the host, qualified by the RPC port when it is not the default.
    pub fn key(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None if self.rpc_port == DEFAULT_RPC_PORT => self.host.clone(),
            None => format!("{}:{}", self.host, self.rpc_port),
        }
    }

    /// Suffix that separates this node's home, staging directory and
    /// service from other nodes on the same host. `None` for a node on
    /// default ports with no instance name.
    pub fn instance(&self) -> Option<String> {
        match &self.name {
            Some(name) => Some(sanitize(name)).filter(|s| !s.is_empty()),
            None if self.rpc_port == DEFAULT_RPC_PORT => None,
            None => Some(self.rpc_port.to_string()),
        }
    }

    /// Base URL of the CometBFT RPC endpoint
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}", self.host, self.rpc_port)
    }

    /// Address other nodes dial for p2p
    pub fn p2p_address(&self) -> String {
        format!("{}:{}", self.host, self.p2p_port)
    }

    /// Moniker of the node: the instance name when set, else derived from
    /// the host name.
    ///
    /// `node1.example.com` becomes `node1`; IPv4 addresses become
    /// `node-10-0-0-5`. A node on a non-default RPC port gets the port
    /// appended, so `127.0.0.1:26667` is `node-127-0-0-1-26667`.
    pub fn moniker(&self) -> String {
        let base = self.host_moniker();
        match (&self.name, self.instance()) {
            (Some(_), Some(name)) => name,
            (None, Some(port)) => format!("{}-{}", base, port),
            _ => base,
        }
    }

    fn host_moniker(&self) -> String {
        if let Ok(ip) = self.host.parse::<Ipv4Addr>() {
            let octets = ip.octets();
            return format!(
                "node-{}-{}-{}-{}",
                octets[0], octets[1], octets[2], octets[3]
            );
        }

        let label = self.host.split('.').next().unwrap_or_default();
        let moniker = sanitize(label);

        if moniker.is_empty() {
            "node".to_string()
        } else {
            moniker
        }
    }
}

/// Lowercase, with anything but ASCII alphanumerics and `-` replaced by `-`
fn sanitize(value: &str) -> String {
    let cleaned: String = value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    cleaned.trim_matches('-').to_string()
}

impl fmt::Display for NodeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)?;
        if let Some(instance) = self.instance() {
            write!(f, "[{}]", instance)?;
        }
        write!(f, " ({})", self.role)
    }
}
