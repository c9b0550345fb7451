//! Concurrent fan-out of status probes across a set of nodes
//!
//! Concurrency is bounded by a semaphore, each probe has its own timeout,
//! and the whole report shares one deadline. Nodes still pending at the
//! deadline are reported unreachable; one slow node never blocks the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::health::probe::StatusProbe;
use crate::models::fleet::{FleetReport, FleetSummary, NodeReport};
use crate::models::status::StatusSample;
use crate::models::target::NodeTarget;
use crate::storage::settings::FleetSettings;

/// Builds fleet reports and remembers the latest sample per node
pub struct FleetAggregator {
    probe: Arc<dyn StatusProbe>,
    settings: FleetSettings,
    latest: RwLock<HashMap<String, StatusSample>>,
}

impl FleetAggregator {
    pub fn new(probe: Arc<dyn StatusProbe>, settings: FleetSettings) -> Self {
        Self {
            probe,
            settings,
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Most recent successful sample of a node, by `NodeTarget::key`
    pub async fn latest(&self, node: &str) -> Option<StatusSample> {
        self.latest.read().await.get(node).cloned()
    }

    /// Probe every target and summarize
    pub async fn report(&self, targets: &[NodeTarget]) -> FleetReport {
        let probe_timeout = Duration::from_secs(self.settings.probe_timeout_secs);
        let deadline = Instant::now() + Duration::from_secs(self.settings.overall_timeout_secs);
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));

        info!("Probing {} nodes", targets.len());

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let sem = Arc::clone(&semaphore);
            let probe = Arc::clone(&self.probe);
            let target = target.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.map_err(|e| e.to_string())?;
                match tokio::time::timeout(probe_timeout, probe.sample(&target)).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("no response within {:?}", probe_timeout)),
                }
            }));
        }

        let mut nodes = Vec::with_capacity(targets.len());
        for (target, handle) in targets.iter().zip(handles) {
            let abort = handle.abort_handle();
            let result = match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(format!("probe task failed: {}", e)),
                Err(_) => {
                    abort.abort();
                    Err("report deadline exceeded".to_string())
                }
            };

            match result {
                Ok(sample) => {
                    debug!("{}: height {}", target, sample.block_height);
                    nodes.push(NodeReport {
                        node: target.key(),
                        host: target.host.clone(),
                        rpc_port: target.rpc_port,
                        role: target.role,
                        reachable: true,
                        height: Some(sample.block_height),
                        peer_count: Some(sample.peer_count),
                        catching_up: Some(sample.catching_up),
                        error: None,
                    });
                    self.latest.write().await.insert(target.key(), sample);
                }
                Err(e) => {
                    warn!("{}: {}", target, e);
                    nodes.push(NodeReport {
                        node: target.key(),
                        host: target.host.clone(),
                        rpc_port: target.rpc_port,
                        role: target.role,
                        reachable: false,
                        height: None,
                        peer_count: None,
                        catching_up: None,
                        error: Some(e),
                    });
                }
            }
        }

        let summary = summarize(&nodes, self.settings.height_threshold);
        info!(
            "{}/{} nodes running, max height {:?}",
            summary.nodes_running, summary.nodes_total, summary.max_height
        );

        FleetReport {
            generated_at: Utc::now(),
            nodes,
            summary,
        }
    }
}

/// Consensus is likely healthy when strictly more than half of all nodes
/// are past `height_threshold`
pub fn summarize(nodes: &[NodeReport], height_threshold: u64) -> FleetSummary {
    let nodes_total = nodes.len();
    let nodes_running = nodes.iter().filter(|n| n.reachable).count();
    let max_height = nodes.iter().filter_map(|n| n.height).max();
    let past_threshold = nodes
        .iter()
        .filter(|n| n.height.is_some_and(|h| h > height_threshold))
        .count();

    FleetSummary {
        nodes_total,
        nodes_running,
        max_height,
        consensus_likely_healthy: past_threshold * 2 > nodes_total,
    }
}
