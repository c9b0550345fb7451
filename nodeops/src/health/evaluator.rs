//! Block-production health check: two samples, one window apart

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::OpsError;
use crate::health::probe::{ProbeError, StatusProbe};
use crate::models::status::{Classification, HealthVerdict, StatusSample};
use crate::models::target::NodeTarget;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Classify a node from two samples taken `window` apart.
///
/// Any failed sample makes the node unreachable. Otherwise the height delta
/// decides: positive is active, zero is stalled, negative is regressed.
pub fn evaluate(
    node: &str,
    first: &Result<StatusSample, ProbeError>,
    second: &Result<StatusSample, ProbeError>,
    window: Duration,
) -> HealthVerdict {
    let start_height = first.as_ref().ok().map(|s| s.block_height);
    let end_height = second.as_ref().ok().map(|s| s.block_height);

    let (s0, s1) = match (first, second) {
        (Ok(s0), Ok(s1)) => (s0, s1),
        (Err(err), _) | (_, Err(err)) => {
            return HealthVerdict {
                node: node.to_string(),
                start_height,
                end_height,
                blocks_produced: 0,
                elapsed_seconds: window.as_secs_f64(),
                rate_per_minute: 0.0,
                classification: Classification::Unreachable,
                diagnosis: Some(err.to_string()),
                latest: second.as_ref().ok().cloned(),
            };
        }
    };

    let delta = (s1.block_height as i128 - s0.block_height as i128) as i64;
    let (classification, diagnosis) = match delta {
        d if d > 0 && s1.catching_up => (
            Classification::Active,
            Some("node is still catching up".to_string()),
        ),
        d if d > 0 => (Classification::Active, None),
        0 => (
            Classification::Stalled,
            Some(format!("height stayed at {}", s0.block_height)),
        ),
        _ => (
            Classification::Regressed,
            Some(
                OpsError::Regressed {
                    from: s0.block_height,
                    to: s1.block_height,
                }
                .to_string(),
            ),
        ),
    };

    let rate_per_minute = if delta > 0 && !window.is_zero() {
        delta as f64 * 60.0 / window.as_secs_f64()
    } else {
        0.0
    };

    HealthVerdict {
        node: node.to_string(),
        start_height,
        end_height,
        blocks_produced: delta,
        elapsed_seconds: window.as_secs_f64(),
        rate_per_minute,
        classification,
        diagnosis,
        latest: Some(s1.clone()),
    }
}

/// Check whether `target` is producing blocks over `window`
pub async fn check_health(
    probe: &dyn StatusProbe,
    target: &NodeTarget,
    window: Duration,
) -> HealthVerdict {
    check_health_with(probe, target, window, tokio::time::sleep).await
}

/// Same as [`check_health`] with an injectable sleep
pub async fn check_health_with<S, F>(
    probe: &dyn StatusProbe,
    target: &NodeTarget,
    window: Duration,
    sleep_fn: S,
) -> HealthVerdict
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let first = probe.sample(target).await;
    if let Err(err) = &first {
        warn!("{}: first sample failed: {}", target, err);
        let skipped = Err(ProbeError::Unreachable(
            "second sample not taken".to_string(),
        ));
        return evaluate(&target.host, &first, &skipped, window);
    }

    debug!("{}: waiting {:?} between samples", target, window);
    sleep_fn(window).await;

    let second = probe.sample(target).await;
    let verdict = evaluate(&target.host, &first, &second, window);
    info!(
        "{}: {} ({} blocks, {:.1}/min)",
        target, verdict.classification, verdict.blocks_produced, verdict.rate_per_minute
    );
    verdict
}

/// Re-run the check while it is stalled or unreachable, up to `retries` more
/// times. A regression is never retried.
pub async fn check_health_with_retries<S, F>(
    probe: &dyn StatusProbe,
    target: &NodeTarget,
    window: Duration,
    retries: u32,
    cooldown: &CooldownOptions,
    sleep_fn: S,
) -> HealthVerdict
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let mut attempt = 0;
    loop {
        let verdict = check_health_with(probe, target, window, &sleep_fn).await;
        let retryable = matches!(
            verdict.classification,
            Classification::Stalled | Classification::Unreachable
        );
        if !retryable || attempt >= retries {
            return verdict;
        }

        let delay = calc_exp_backoff(cooldown, attempt);
        warn!(
            "{}: {}, retrying in {:?} ({}/{})",
            target,
            verdict.classification,
            delay,
            attempt + 1,
            retries
        );
        sleep_fn(delay).await;
        attempt += 1;
    }
}
