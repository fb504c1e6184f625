//! pinger-agent - fping based reachability probe
//!
//! One-shot by default; `--daemon` keeps measuring with a pause between
//! cycles until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use pinger_agent::cli::Args;
use pinger_agent::instance::{InstanceMarker, LinuxProcessTable};
use pinger_agent::probe::FpingExecutor;
use pinger_agent::Scheduler;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let level = if args.debug {
        tracing::Level::DEBUG
    } else if args.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(level.into())
        )
        .init();

    let config = args.load_config()?;
    let settings = Arc::new(config.finalize());
    info!(
        "pinger-agent v{} ({} static targets, {})",
        env!("CARGO_PKG_VERSION"),
        settings.targets.len(),
        if settings.daemon { "daemon" } else { "one-shot" }
    );

    let executor = Box::new(FpingExecutor::new(settings.fping.clone()));
    let mut scheduler = Scheduler::new(settings.clone(), executor)?;

    if !settings.daemon {
        return Ok(scheduler.run_once().await);
    }

    let marker = match &settings.pidfile {
        Some(path) => Some(
            InstanceMarker::new(path, LinuxProcessTable)
                .context("Cannot start daemon without a process identity")?,
        ),
        None => None,
    };
    if let Some(marker) = &marker {
        if let Err(e) = marker.claim() {
            warn!("Could not claim marker file: {}", e);
        }
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });

    scheduler.run_forever(rx).await;

    if let Some(marker) = &marker {
        if let Err(e) = marker.release() {
            error!("Failed to remove marker file: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, finishing current cycle");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, finishing current cycle");
        }
    }
}
