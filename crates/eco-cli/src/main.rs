//! ecoctl
//!
//! Command-line control for a running eco daemon.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eco_cli::output::{format_event, format_progress, format_state, print_error, print_success};
use eco_cli::{App, EcoClient};
use eco_core::config::{self, DaemonConfig};
use eco_core::NetAddr;
use eco_protocol::{FeedEvent, SyncMode};

#[derive(Parser)]
#[command(name = "ecoctl")]
#[command(author, version, about = "Control a running eco daemon")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the daemon configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Daemon application directory (overrides config)
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,

    /// Daemon address as "<network> <address>" (overrides the address file)
    #[arg(long, global = true)]
    addr: Option<NetAddr>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show installation state and service status
    Status,

    /// Install the latest release and create the wallet
    Init {
        /// Sync mode: spv or full
        #[arg(short, long)]
        mode: SyncMode,
        /// Wallet passphrase
        #[arg(long, env = "ECO_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },

    /// Stream sync progress and service status changes
    Watch,

    /// Open the GUI wallet (decrediton) or the exchange (dexc)
    Start {
        /// decrediton or dexc
        app: App,
    },

    /// Run a dcrctl command against the wallet or node
    Ctl {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn client(cli: &Cli) -> Result<EcoClient> {
    let mut daemon = match &cli.config {
        Some(path) => config::load_config::<DaemonConfig>(path)?,
        None => {
            let default_path = config::default_config_path();
            if default_path.exists() {
                config::load_config(&default_path)?
            } else {
                DaemonConfig::default()
            }
        }
    };
    if let Some(app_dir) = &cli.app_dir {
        daemon.app_dir = app_dir.clone();
    }

    let paths = daemon.paths();
    let ca_cert = paths.tls().ca_cert;
    match &cli.addr {
        Some(addr) => EcoClient::connect(addr.clone(), &ca_cert),
        None => EcoClient::from_addr_file(&paths.addr_file(), &ca_cert),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = client(&cli)?;

    match cli.command {
        Commands::Status => {
            let state = client.state().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                println!("{}", format_state(&state));
            }
        }

        Commands::Init { mode, passphrase } => {
            if mode == SyncMode::Uninitialized {
                bail!("sync mode must be spv or full");
            }
            let passphrase = passphrase.unwrap_or_default();
            let mut progress = client.init(mode, passphrase.as_bytes()).await?;

            let mut last = None;
            while let Some(report) = progress.recv().await {
                let report = report?;
                if cli.json {
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    println!("{}", format_progress(&report));
                }
                last = Some(report);
            }

            match last {
                Some(report) if !report.err.is_empty() => bail!("{}", report.err),
                Some(report) if report.is_complete() => {
                    if !cli.json {
                        print_success("Initialization complete");
                    }
                }
                _ => bail!("Daemon closed the connection before initialization finished"),
            }
        }

        Commands::Watch => {
            let mut events = client.feed().await?;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.next() => match event {
                        Some(event) => print_event(&event?, cli.json)?,
                        None => break,
                    },
                }
            }
        }

        Commands::Start { app } => {
            client.start_app(app).await?;
            if !cli.json {
                print_success(&format!("Started {:?}", app).to_lowercase());
            }
        }

        Commands::Ctl { args } => {
            let body = client.ctl(&join_args(&args)).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "body": body }));
            } else {
                print!("{}", body);
            }
        }
    }

    Ok(())
}

fn print_event(event: &FeedEvent, json: bool) -> Result<()> {
    if !json {
        println!("{}", format_event(event));
        return Ok(());
    }
    let value = match event {
        FeedEvent::Sync(progress) => serde_json::json!({ "sync": progress }),
        FeedEvent::Status(status) => serde_json::json!({ "status": status }),
    };
    println!("{}", value);
    Ok(())
}

/// Rebuild a command line the daemon will split back into `args`
fn join_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(' ') || arg.contains('"') {
                format!("\"{}\"", arg.replace('"', "\"\""))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_args_quotes() {
        let args = vec!["getbalance".to_string(), "my account".to_string()];
        assert_eq!(join_args(&args), "getbalance \"my account\"");
        assert_eq!(join_args(&["getinfo".to_string()]), "getinfo");
    }
}
