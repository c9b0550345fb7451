//! Fleet watch worker: repeats the fleet report on an interval

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info};

use crate::fleet::FleetAggregator;
use crate::models::fleet::FleetReport;
use crate::models::target::NodeTarget;

/// Monitor worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between reports
    pub interval: Duration,

    /// Stop after this many reports; runs until shutdown when `None`
    pub max_reports: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_reports: None,
        }
    }
}

/// Run the monitor worker. The first report is taken immediately.
/// Returns the number of reports produced.
pub async fn run<S, F, R>(
    options: &Options,
    aggregator: &FleetAggregator,
    targets: &[NodeTarget],
    mut on_report: R,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) -> usize
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
    R: FnMut(&FleetReport),
{
    info!("Monitor worker starting...");
    let mut reports = 0;

    loop {
        let report = tokio::select! {
            biased;
            _ = &mut shutdown_signal => {
                info!("Monitor worker shutting down...");
                return reports;
            }
            report = aggregator.report(targets) => report,
        };

        on_report(&report);
        reports += 1;
        if options.max_reports.is_some_and(|max| reports >= max) {
            debug!("Monitor worker produced {} reports", reports);
            return reports;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown_signal => {
                info!("Monitor worker shutting down...");
                return reports;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
