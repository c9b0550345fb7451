//! Fleet monitor worker tests

use std::time::Duration;

use nodeops::fleet::FleetAggregator;
use nodeops::models::target::{NodeTarget, Role};
use nodeops::storage::settings::FleetSettings;
use nodeops::workers::monitor::{run, Options};

use crate::support::ScriptedProbe;

fn targets() -> Vec<NodeTarget> {
    vec![NodeTarget::new("node1.example.com", "root", Role::Master)]
}

#[tokio::test]
async fn test_monitor_stops_after_max_reports() {
    let probe = ScriptedProbe::new();
    probe.push_heights("node1.example.com", &[10, 12, 14]);
    let aggregator = FleetAggregator::new(probe.clone(), FleetSettings::default());
    let options = Options {
        interval: Duration::from_secs(30),
        max_reports: Some(2),
    };

    let mut heights = Vec::new();
    let reports = run(
        &options,
        &aggregator,
        &targets(),
        |report| heights.push(report.summary.max_height),
        |_| async {},
        Box::pin(std::future::pending::<()>()),
    )
    .await;

    assert_eq!(reports, 2);
    assert_eq!(heights, vec![Some(10), Some(12)]);
    assert_eq!(probe.calls(), 2);
}

#[tokio::test]
async fn test_monitor_honors_shutdown() {
    let probe = ScriptedProbe::new();
    let aggregator = FleetAggregator::new(probe.clone(), FleetSettings::default());

    let reports = run(
        &Options::default(),
        &aggregator,
        &targets(),
        |_| {},
        |_| async {},
        Box::pin(async {}),
    )
    .await;

    assert_eq!(reports, 0);
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn test_monitor_stops_during_interval() {
    let probe = ScriptedProbe::new();
    probe.push_heights("node1.example.com", &[10]);
    let aggregator = FleetAggregator::new(probe.clone(), FleetSettings::default());
    let (tx, mut rx) = tokio::sync::watch::channel(false);

    let reports = run(
        &Options::default(),
        &aggregator,
        &targets(),
        |_| {
            let _ = tx.send(true);
        },
        tokio::time::sleep,
        Box::pin(async move {
            let _ = rx.wait_for(|stop| *stop).await;
        }),
    )
    .await;

    assert_eq!(reports, 1);
}
