//! nodeops - Entry Point
//!
//! Deploys pokerchaind nodes and verifies they are producing blocks.

use std::process::ExitCode;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use nodeops::app::cli::{Cli, Command};
use nodeops::app::run::{run, Context};
use nodeops::errors::OpsError;
use nodeops::logs::{init_logging, LogOptions};
use nodeops::models::outcome::Outcome;
use nodeops::storage::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Commands that work without an inventory fall back to defaults
    let needs_settings = !matches!(
        cli.command,
        Command::Version | Command::Diagnostic | Command::Fingerprint(_)
    );
    let settings = match Settings::load(&cli.config).await {
        Ok(settings) => settings,
        Err(OpsError::ConfigMissing(_)) if !needs_settings => Settings::default(),
        Err(e) => {
            eprintln!("Unable to read settings: {e}");
            return ExitCode::from(Outcome::HardFailure.exit_code() as u8);
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: cli.log_level.clone().unwrap_or(settings.log_level.clone()),
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        await_shutdown_signal().await;
        warn!("Finishing the current step, then stopping");
        let _ = shutdown_tx.send(true);
    });

    let ctx = Context::new(settings, cli.json, shutdown_rx);
    let outcome = match run(cli, ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{e}");
            if e.is_transient() {
                Outcome::SoftFailure
            } else {
                Outcome::HardFailure
            }
        }
    };

    info!("Finished: {:?}", outcome);
    ExitCode::from(outcome.exit_code() as u8)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Failed to install signal handlers");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            return std::future::pending().await;
        }
        info!("Ctrl+C received, shutting down...");
    }
}
