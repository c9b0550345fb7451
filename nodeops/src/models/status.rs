//! Status samples and health verdicts

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::outcome::Outcome;

/// One normalized observation of a node's status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSample {
    /// CometBFT node ID
    pub node_id: String,

    pub moniker: String,

    pub chain_id: String,

    pub observed_at: DateTime<Utc>,

    pub block_height: u64,

    pub latest_block_time: Option<DateTime<Utc>>,

    /// Still replaying history rather than following consensus
    pub catching_up: bool,

    pub peer_count: u32,

    /// Only reported for validators
    pub voting_power: Option<u64>,
}

/// One entry of the validator set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub address: String,
    pub voting_power: u64,
    pub proposer_priority: i64,
}

/// Health classification of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Height advanced during the window
    Active,

    /// Height unchanged
    Stalled,

    /// Height moved backwards: reset, rollback or wrong network
    Regressed,

    /// A sample could not be obtained
    Unreachable,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Classification::Active => "active",
            Classification::Stalled => "stalled",
            Classification::Regressed => "regressed",
            Classification::Unreachable => "unreachable",
        };
        f.write_str(name)
    }
}

/// Verdict from two samples of the same node taken one window apart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    /// Host the verdict is about
    pub node: String,

    pub start_height: Option<u64>,

    pub end_height: Option<u64>,

    /// Height delta; negative when regressed
    pub blocks_produced: i64,

    pub elapsed_seconds: f64,

    pub rate_per_minute: f64,

    pub classification: Classification,

    /// Probe failure or other context
    pub diagnosis: Option<String>,

    /// Second sample, when obtained
    pub latest: Option<StatusSample>,
}

impl HealthVerdict {
    pub fn is_active(&self) -> bool {
        self.classification == Classification::Active
    }

    pub fn outcome(&self) -> Outcome {
        match self.classification {
            Classification::Active => Outcome::Success,
            Classification::Stalled | Classification::Unreachable => Outcome::SoftFailure,
            Classification::Regressed => Outcome::HardFailure,
        }
    }
}
