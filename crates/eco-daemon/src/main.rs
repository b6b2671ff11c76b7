//! eco daemon
//!
//! Installs, supervises and reports on the local Decred services.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eco_core::config::{self, DaemonConfig};
use eco_core::tls;
use eco_core::NetAddr;
use eco_daemon::{ControlServer, Eco};

#[derive(Parser)]
#[command(name = "ecod")]
#[command(about = "eco daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address as "<network> <address>", e.g. "tcp4 127.0.0.1:45219"
    #[arg(short, long)]
    listen: Option<NetAddr>,

    /// Application data directory (overrides config)
    #[arg(long)]
    app_dir: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("eco daemon starting...");

    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                DaemonConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            DaemonConfig::default()
        }
    };

    if let Some(app_dir) = args.app_dir {
        config.app_dir = app_dir;
    }
    if let Some(listen) = args.listen {
        config.listen = Some(listen);
    }

    let paths = config.paths();
    std::fs::create_dir_all(paths.root())
        .with_context(|| format!("Failed to create {:?}", paths.root()))?;
    let tls_paths = paths.tls();
    tls::ensure_certificates(&tls_paths).context("Failed to prepare TLS certificates")?;
    let tls_config = tls::server_config(&tls_paths)?;

    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let listen = config.listen_addr();
    let eco = Eco::open(config, &cancel).context("Failed to open orchestrator")?;

    let orchestrator = {
        let eco = eco.clone();
        tokio::spawn(async move { eco.run().await })
    };

    let server = ControlServer::new(eco, tls_config, cancel.clone());
    let served = server.run(&listen, &paths.addr_file()).await;
    if served.is_err() {
        cancel.cancel();
    }

    if let Err(e) = orchestrator.await {
        tracing::error!("Orchestrator task failed: {}", e);
    }
    served.context("Control server failed")?;

    tracing::info!("eco daemon shutdown complete");
    Ok(())
}
