//! Health verification tests with a scripted probe and recorded sleeps

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nodeops::health::evaluator::{check_health_with, check_health_with_retries};
use nodeops::health::ProbeError;
use nodeops::models::outcome::Outcome;
use nodeops::models::status::Classification;
use nodeops::models::target::{NodeTarget, Role};
use nodeops::utils::CooldownOptions;

use crate::support::{sample, ScriptedProbe};

const WINDOW: Duration = Duration::from_secs(10);

fn node() -> NodeTarget {
    NodeTarget::new("node1.example.com", "root", Role::Sync)
}

/// Sleep that returns immediately and records what it was asked for
fn recording_sleep() -> (
    Arc<Mutex<Vec<Duration>>>,
    impl Fn(Duration) -> std::future::Ready<()>,
) {
    let slept = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&slept);
    let sleep_fn = move |d: Duration| {
        recorder.lock().unwrap().push(d);
        std::future::ready(())
    };
    (slept, sleep_fn)
}

#[tokio::test]
async fn test_producing_node_is_active() {
    let probe = ScriptedProbe::new();
    let target = node();
    probe.push_heights(&target.host, &[100, 115]);
    let (slept, sleep_fn) = recording_sleep();

    let verdict = check_health_with(probe.as_ref(), &target, WINDOW, sleep_fn).await;

    assert_eq!(verdict.classification, Classification::Active);
    assert_eq!(verdict.start_height, Some(100));
    assert_eq!(verdict.end_height, Some(115));
    assert_eq!(verdict.blocks_produced, 15);
    assert_eq!(verdict.rate_per_minute, 90.0);
    assert_eq!(verdict.outcome(), Outcome::Success);
    assert_eq!(*slept.lock().unwrap(), vec![WINDOW]);
    assert_eq!(probe.calls(), 2);
}

#[tokio::test]
async fn test_flat_height_is_stalled() {
    let probe = ScriptedProbe::new();
    let target = node();
    probe.push_heights(&target.host, &[50, 50]);
    let (_, sleep_fn) = recording_sleep();

    let verdict = check_health_with(probe.as_ref(), &target, WINDOW, sleep_fn).await;

    assert_eq!(verdict.classification, Classification::Stalled);
    assert_eq!(verdict.blocks_produced, 0);
    assert_eq!(verdict.rate_per_minute, 0.0);
    assert!(!verdict.is_active());
    assert_eq!(verdict.outcome(), Outcome::SoftFailure);
}

#[tokio::test]
async fn test_lower_height_is_regressed() {
    let probe = ScriptedProbe::new();
    let target = node();
    probe.push_heights(&target.host, &[200, 180]);
    let (_, sleep_fn) = recording_sleep();

    let verdict = check_health_with(probe.as_ref(), &target, WINDOW, sleep_fn).await;

    assert_eq!(verdict.classification, Classification::Regressed);
    assert_eq!(verdict.blocks_produced, -20);
    assert_eq!(verdict.rate_per_minute, 0.0);
    assert_eq!(verdict.outcome(), Outcome::HardFailure);
}

#[tokio::test]
async fn test_failed_second_sample_is_unreachable() {
    let probe = ScriptedProbe::new();
    let target = node();
    probe.push_heights(&target.host, &[100]);
    let (_, sleep_fn) = recording_sleep();

    let verdict = check_health_with(probe.as_ref(), &target, WINDOW, sleep_fn).await;

    assert_eq!(verdict.classification, Classification::Unreachable);
    assert_eq!(verdict.start_height, Some(100));
    assert_eq!(verdict.end_height, None);
    assert!(verdict.diagnosis.as_deref().unwrap().contains("connection refused"));
    assert_eq!(verdict.outcome(), Outcome::SoftFailure);
}

#[tokio::test]
async fn test_failed_first_sample_skips_window() {
    let probe = ScriptedProbe::new();
    let target = node();
    probe.push(
        &target.host,
        Err(ProbeError::MalformedResponse("latest_block_height: \"abc\"".to_string())),
    );
    let (slept, sleep_fn) = recording_sleep();

    let verdict = check_health_with(probe.as_ref(), &target, WINDOW, sleep_fn).await;

    assert_eq!(verdict.classification, Classification::Unreachable);
    assert!(verdict.diagnosis.unwrap().starts_with("malformed response"));
    assert!(slept.lock().unwrap().is_empty());
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn test_catching_up_is_still_active() {
    let probe = ScriptedProbe::new();
    let target = node();
    let mut second = sample(400);
    second.catching_up = true;
    probe.push(&target.host, Ok(sample(100)));
    probe.push(&target.host, Ok(second));
    let (_, sleep_fn) = recording_sleep();

    let verdict = check_health_with(probe.as_ref(), &target, WINDOW, sleep_fn).await;

    assert_eq!(verdict.classification, Classification::Active);
    assert_eq!(verdict.diagnosis.as_deref(), Some("node is still catching up"));
    assert!(verdict.latest.unwrap().catching_up);
}

#[tokio::test]
async fn test_retry_recovers_stalled_node() {
    let probe = ScriptedProbe::new();
    let target = node();
    probe.push_heights(&target.host, &[50, 50, 51, 60]);
    let (slept, sleep_fn) = recording_sleep();
    let cooldown = CooldownOptions {
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(8),
        multiplier: 2.0,
    };

    let verdict =
        check_health_with_retries(probe.as_ref(), &target, WINDOW, 2, &cooldown, sleep_fn).await;

    assert_eq!(verdict.classification, Classification::Active);
    assert_eq!(verdict.blocks_produced, 9);
    assert_eq!(probe.calls(), 4);
    assert_eq!(
        *slept.lock().unwrap(),
        vec![WINDOW, Duration::from_secs(1), WINDOW]
    );
}

#[tokio::test]
async fn test_regression_is_not_retried() {
    let probe = ScriptedProbe::new();
    let target = node();
    probe.push_heights(&target.host, &[200, 180, 181, 190]);
    let (_, sleep_fn) = recording_sleep();

    let verdict = check_health_with_retries(
        probe.as_ref(),
        &target,
        WINDOW,
        3,
        &CooldownOptions::default(),
        sleep_fn,
    )
    .await;

    assert_eq!(verdict.classification, Classification::Regressed);
    assert_eq!(probe.calls(), 2);
}
