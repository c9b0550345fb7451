//! Status probe for the node's CometBFT RPC endpoint
//!
//! The probe never retries; retry policy belongs to its callers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::errors::OpsError;
use crate::models::status::{StatusSample, ValidatorEntry};
use crate::models::target::{NodeTarget, Role};

/// Why a sample could not be obtained
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Connection refused, reset or timed out
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered but the fields could not be parsed,
    /// usually a version mismatch
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<ProbeError> for OpsError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Unreachable(msg) => OpsError::Unreachable(msg),
            ProbeError::MalformedResponse(msg) => OpsError::MalformedResponse(msg),
        }
    }
}

/// Queries one node's status surface
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Take one normalized sample
    async fn sample(&self, target: &NodeTarget) -> Result<StatusSample, ProbeError>;

    /// Current validator set with voting power
    async fn validators(&self, target: &NodeTarget) -> Result<Vec<ValidatorEntry>, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    node_info: NodeInfo,
    sync_info: SyncInfo,
    validator_info: Option<ValidatorInfo>,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    id: String,
    network: String,
    #[serde(default)]
    moniker: String,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    latest_block_height: String,
    latest_block_time: Option<String>,
    catching_up: bool,
}

#[derive(Debug, Deserialize)]
struct ValidatorInfo {
    voting_power: String,
}

#[derive(Debug, Deserialize)]
struct NetInfoResult {
    n_peers: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorsResult {
    validators: Vec<RawValidator>,
}

#[derive(Debug, Deserialize)]
struct RawValidator {
    address: String,
    voting_power: String,
    proposer_priority: String,
}

/// Fields of a `/status` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub node_id: String,
    pub moniker: String,
    pub chain_id: String,
    pub block_height: u64,
    pub latest_block_time: Option<DateTime<Utc>>,
    pub catching_up: bool,
    pub voting_power: Option<u64>,
}

fn malformed(what: &str, err: impl std::fmt::Display) -> ProbeError {
    ProbeError::MalformedResponse(format!("{}: {}", what, err))
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ProbeError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| malformed(field, format!("{:?} ({})", value, e)))
}

/// Parse a `/status` body
pub fn parse_status(body: &str) -> Result<NodeStatus, ProbeError> {
    let envelope: RpcEnvelope<StatusResult> =
        serde_json::from_str(body).map_err(|e| malformed("status", e))?;
    let status = envelope.result;

    let block_height = parse_number("latest_block_height", &status.sync_info.latest_block_height)?;

    let latest_block_time = match status.sync_info.latest_block_time.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| malformed("latest_block_time", e))?
                .with_timezone(&Utc),
        ),
    };

    let voting_power = match &status.validator_info {
        Some(info) => Some(parse_number("voting_power", &info.voting_power)?),
        None => None,
    };

    Ok(NodeStatus {
        node_id: status.node_info.id,
        moniker: status.node_info.moniker,
        chain_id: status.node_info.network,
        block_height,
        latest_block_time,
        catching_up: status.sync_info.catching_up,
        voting_power,
    })
}

/// Parse the peer count from a `/net_info` body
pub fn parse_net_info(body: &str) -> Result<u32, ProbeError> {
    let envelope: RpcEnvelope<NetInfoResult> =
        serde_json::from_str(body).map_err(|e| malformed("net_info", e))?;
    parse_number("n_peers", &envelope.result.n_peers)
}

/// Parse a `/validators` body
pub fn parse_validators(body: &str) -> Result<Vec<ValidatorEntry>, ProbeError> {
    let envelope: RpcEnvelope<ValidatorsResult> =
        serde_json::from_str(body).map_err(|e| malformed("validators", e))?;

    envelope
        .result
        .validators
        .into_iter()
        .map(|v| {
            Ok(ValidatorEntry {
                voting_power: parse_number("voting_power", &v.voting_power)?,
                proposer_priority: parse_number("proposer_priority", &v.proposer_priority)?,
                address: v.address,
            })
        })
        .collect()
}

/// Probe over the CometBFT JSON-over-HTTP RPC
#[derive(Debug, Clone)]
pub struct CometRpcProbe {
    client: Client,
}

impl CometRpcProbe {
    /// Create a probe whose every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, OpsError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn endpoint(target: &NodeTarget, path: &str) -> Result<Url, ProbeError> {
        Url::parse(&target.rpc_url())
            .and_then(|base| base.join(path))
            .map_err(|e| ProbeError::Unreachable(format!("invalid RPC address {}: {}", target.rpc_url(), e)))
    }

    async fn get(&self, target: &NodeTarget, path: &str) -> Result<String, ProbeError> {
        let url = Self::endpoint(target, path)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ProbeError::Unreachable(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::MalformedResponse(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ProbeError::Unreachable(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl StatusProbe for CometRpcProbe {
    async fn sample(&self, target: &NodeTarget) -> Result<StatusSample, ProbeError> {
        let status = parse_status(&self.get(target, "status").await?)?;
        let peer_count = parse_net_info(&self.get(target, "net_info").await?)?;

        Ok(StatusSample {
            node_id: status.node_id,
            moniker: status.moniker,
            chain_id: status.chain_id,
            observed_at: Utc::now(),
            block_height: status.block_height,
            latest_block_time: status.latest_block_time,
            catching_up: status.catching_up,
            peer_count,
            voting_power: match target.role {
                Role::Validator => status.voting_power,
                _ => None,
            },
        })
    }

    async fn validators(&self, target: &NodeTarget) -> Result<Vec<ValidatorEntry>, ProbeError> {
        parse_validators(&self.get(target, "validators").await?)
    }
}
