//! Operator-facing report rendering

use std::fmt::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::deploy::genesis::GenesisFingerprint;
use crate::diagnostic::HostDiagnostic;
use crate::errors::OpsError;
use crate::models::deployment::{DeploymentLog, PhaseStatus};
use crate::models::fleet::FleetReport;
use crate::models::outcome::Outcome;
use crate::models::status::{Classification, HealthVerdict, StatusSample, ValidatorEntry};
use crate::models::target::NodeTarget;
use crate::utils::VersionInfo;

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), OpsError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn outcome_label(outcome: Outcome) -> ColoredString {
    match outcome {
        Outcome::Success => "OK".green().bold(),
        Outcome::SoftFailure => "DEGRADED".yellow().bold(),
        Outcome::HardFailure => "FAILED".red().bold(),
    }
}

fn status_label(status: PhaseStatus) -> ColoredString {
    match status {
        PhaseStatus::Success => "done".green(),
        PhaseStatus::Skipped => "skipped".cyan(),
        PhaseStatus::Failed => "failed".red(),
    }
}

fn classification_label(classification: Classification) -> ColoredString {
    let name = classification.to_string();
    match classification {
        Classification::Active => name.green(),
        Classification::Stalled => name.yellow(),
        Classification::Regressed => name.red(),
        Classification::Unreachable => name.red(),
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn deployment(log: &DeploymentLog) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({}) run {}",
        outcome_label(log.outcome()),
        log.target,
        log.target.role,
        log.run_id
    );
    for entry in &log.entries {
        let _ = writeln!(
            out,
            "  {:<18} {:<8} {}",
            entry.phase.name(),
            status_label(entry.status),
            entry.detail
        );
    }
    let _ = writeln!(out, "  final state: {:?}", log.final_state);
    if let Some(hint) = log.rollback_hint() {
        let _ = writeln!(out, "  {} {}", "rollback:".yellow(), hint);
    }
    out
}

pub fn verdict(verdict: &HealthVerdict) -> String {
    let mut out = format!(
        "{:<24} {} {:<12} {} -> {} ({:+} blocks in {:.0}s, {:.1}/min)",
        verdict.node,
        outcome_label(verdict.outcome()),
        classification_label(verdict.classification),
        or_dash(verdict.start_height),
        or_dash(verdict.end_height),
        verdict.blocks_produced,
        verdict.elapsed_seconds,
        verdict.rate_per_minute,
    );
    if let Some(diagnosis) = &verdict.diagnosis {
        let _ = write!(out, "\n  {}", diagnosis);
    }
    out
}

pub fn sample(target: &NodeTarget, result: &Result<StatusSample, OpsError>) -> String {
    match result {
        Ok(s) => {
            let mut line = format!(
                "{:<24} {} height {} peers {} chain {} id {}",
                target.key(),
                "up".green(),
                s.block_height,
                s.peer_count,
                s.chain_id,
                s.node_id
            );
            if s.catching_up {
                let _ = write!(line, " {}", "catching up".yellow());
            }
            if let Some(power) = s.voting_power {
                let _ = write!(line, " power {}", power);
            }
            line
        }
        Err(e) => format!("{:<24} {} {}", target.key(), "down".red(), e),
    }
}

pub fn validators(validators: &[ValidatorEntry]) -> String {
    let mut out = format!("{} validators\n", validators.len());
    for v in validators {
        let _ = writeln!(
            out,
            "  {} power {} priority {}",
            v.address, v.voting_power, v.proposer_priority
        );
    }
    out
}

pub fn fleet(report: &FleetReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        outcome_label(report.outcome())
    );
    for node in &report.nodes {
        let state = if node.reachable { "up".green() } else { "down".red() };
        let _ = write!(
            out,
            "  {:<24} {:<10} {:<5} height {:<8} peers {}",
            node.node,
            node.role.to_string(),
            state,
            or_dash(node.height),
            or_dash(node.peer_count)
        );
        if node.catching_up == Some(true) {
            let _ = write!(out, " {}", "catching up".yellow());
        }
        if let Some(error) = &node.error {
            let _ = write!(out, " ({})", error);
        }
        out.push('\n');
    }
    let summary = &report.summary;
    let _ = writeln!(
        out,
        "  {}/{} running, max height {}, consensus {}",
        summary.nodes_running,
        summary.nodes_total,
        or_dash(summary.max_height),
        if summary.consensus_likely_healthy {
            "likely healthy".green()
        } else {
            "at risk".red()
        }
    );
    out
}

pub fn fingerprint(file: &str, fingerprint: &GenesisFingerprint, expected: Option<&GenesisFingerprint>) -> String {
    match expected {
        None => format!("{}  {}", fingerprint, file),
        Some(expected) if expected == fingerprint => {
            format!("{}  {} {}", fingerprint, file, "matches".green())
        }
        Some(expected) => format!(
            "{}  {} {} (expected {})",
            fingerprint,
            file,
            "MISMATCH".red().bold(),
            expected
        ),
    }
}

pub fn diagnostic(diag: &HostDiagnostic) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "host:   {}", diag.hostname);
    let _ = writeln!(out, "os:     {} ({})", diag.os, diag.arch);
    let _ = writeln!(out, "cpus:   {}", diag.cpu_count);
    let _ = writeln!(out, "memory: {} MiB", diag.memory_total / (1024 * 1024));
    for tool in &diag.tools {
        match &tool.path {
            Some(path) => {
                let _ = writeln!(out, "{:<8}{} {}", tool.name, "found".green(), path.display());
            }
            None => {
                let _ = writeln!(out, "{:<8}{}", tool.name, "missing".red());
            }
        }
    }
    out
}

pub fn version(info: &VersionInfo) -> String {
    format!("nodeops {} ({} built {})", info.version, info.git_hash, info.build_time)
}

pub fn run_list(logs: &[DeploymentLog]) -> String {
    let mut out = String::new();
    for log in logs {
        let _ = writeln!(
            out,
            "{}  {}  {:<24} {}",
            log.run_id,
            log.started_at.format("%Y-%m-%d %H:%M:%S"),
            log.target.key(),
            outcome_label(log.outcome())
        );
    }
    out
}
