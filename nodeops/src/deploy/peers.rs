//! Seed peer resolution and persistent peer lists

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::OpsError;
use crate::health::probe::StatusProbe;
use crate::storage::settings::{PeerResolutionSettings, SeedSettings};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// CometBFT node IDs are 20-byte addresses in lowercase hex
pub fn is_valid_node_id(id: &str) -> bool {
    id.len() == 40 && id.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// `<id>@<host>:<port>` entry for the seed
pub fn peer_entry(node_id: &str, seed: &SeedSettings) -> String {
    format!("{}@{}", node_id, seed.p2p_address())
}

/// Value of a `persistent_peers = "..."` line; empty when absent
pub fn parse_persistent_peers(output: &str) -> String {
    output
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "persistent_peers").then(|| value.trim().trim_matches('"').to_string())
        })
        .unwrap_or_default()
}

/// Merge `entry` into a comma-separated peer list. An existing entry for the
/// same node ID is replaced; nothing is duplicated.
pub fn merge_peers(existing: &str, entry: &str) -> String {
    let id = entry.split('@').next().unwrap_or(entry);

    let mut peers: Vec<&str> = Vec::new();
    for peer in existing.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let peer_id = peer.split('@').next().unwrap_or(peer);
        if peer_id != id && !peers.contains(&peer) {
            peers.push(peer);
        }
    }
    peers.push(entry);
    peers.join(",")
}

/// Backoff between resolution attempts
pub fn resolution_cooldown(policy: &PeerResolutionSettings) -> CooldownOptions {
    CooldownOptions {
        base_delay: Duration::from_millis(policy.base_delay_ms),
        max_delay: Duration::from_millis(policy.base_delay_ms.saturating_mul(16)),
        multiplier: 2.0,
    }
}

/// Node ID of the seed: the configured one, or probed from the seed's status
/// endpoint with bounded retries. Gives up with `OperatorInputRequired`.
pub async fn resolve_seed_id<S, F>(
    probe: &dyn StatusProbe,
    seed: &SeedSettings,
    policy: &PeerResolutionSettings,
    sleep_fn: S,
) -> Result<String, OpsError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    if seed.host.is_empty() {
        return Err(OpsError::OperatorInputRequired(
            "no seed host configured; set seed.host".to_string(),
        ));
    }

    if let Some(id) = &seed.node_id {
        if !is_valid_node_id(id) {
            return Err(OpsError::InvalidPlan(format!("invalid seed node ID {:?}", id)));
        }
        return Ok(id.clone());
    }

    let target = seed.as_target();
    let cooldown = resolution_cooldown(policy);
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        match probe.sample(&target).await {
            Ok(sample) if is_valid_node_id(&sample.node_id) => {
                info!("Resolved seed {} node ID {}", seed.host, sample.node_id);
                return Ok(sample.node_id);
            }
            Ok(sample) => last_error = format!("seed reported invalid node ID {:?}", sample.node_id),
            Err(e) => last_error = e.to_string(),
        }

        if attempt + 1 < attempts {
            let delay = calc_exp_backoff(&cooldown, attempt);
            warn!(
                "Seed {} not resolved ({}), retrying in {:?} ({}/{})",
                seed.host,
                last_error,
                delay,
                attempt + 1,
                attempts
            );
            sleep_fn(delay).await;
        }
    }

    Err(OpsError::OperatorInputRequired(format!(
        "could not resolve the node ID of seed {} after {} attempts ({}); supply it with --seed-id",
        seed.host, attempts, last_error
    )))
}
