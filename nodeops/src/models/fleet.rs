//! Fleet report models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::outcome::Outcome;
use crate::models::target::Role;

/// Status of one node in a fleet report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node key, unique even when several nodes share a host
    pub node: String,

    pub host: String,

    pub rpc_port: u16,

    pub role: Role,

    pub reachable: bool,

    pub height: Option<u64>,

    pub peer_count: Option<u32>,

    pub catching_up: Option<bool>,

    /// Why the node could not be sampled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fleet-wide summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub nodes_total: usize,

    /// Nodes that answered the probe
    pub nodes_running: usize,

    pub max_height: Option<u64>,

    /// A strict majority of nodes is past the start-up threshold
    pub consensus_likely_healthy: bool,
}

/// Consolidated snapshot of a set of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetReport {
    pub generated_at: DateTime<Utc>,
    pub nodes: Vec<NodeReport>,
    pub summary: FleetSummary,
}

impl FleetReport {
    pub fn unreachable(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| !n.reachable)
    }

    pub fn outcome(&self) -> Outcome {
        if !self.summary.consensus_likely_healthy {
            Outcome::HardFailure
        } else if self.summary.nodes_running < self.summary.nodes_total {
            Outcome::SoftFailure
        } else {
            Outcome::Success
        }
    }
}
