//! Thingbus — shares demo objects with remote callers.
//!
//! Starts a broker and registers two objects:
//!   - `calc`: `add(a, b)`
//!   - `locked_calc`: `initialize()`, `add(a, b)`, `finalize()`; the
//!     calculator is exclusive to one client between initialize and finalize.
//!
//! Usage:
//!   thingbus                                  # tcp://127.0.0.1:6555
//!   thingbus --address tcp://0.0.0.0:7000     # Custom endpoint
//!   thingbus --verbose --log-file             # Debug logs to ~/.thingbus/logs/broker.log

mod objects;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use thingbus_server::{Broker, BrokerConfig};
use thingbus_transport::Endpoint;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::objects::{Calculator, LockedCalculator};

#[derive(Parser, Debug)]
#[command(name = "thingbus", about = "Thingbus — share local objects over RPC")]
struct Cli {
    /// Public endpoint to bind
    #[arg(long, default_value = "tcp://127.0.0.1:6555")]
    address: Endpoint,

    /// Upper bound on each broker/worker wait, in milliseconds
    #[arg(long, default_value = "10")]
    poll_interval_ms: u64,

    /// Maximum concurrent connections
    #[arg(long, default_value = "64")]
    max_connections: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.thingbus/logs/broker.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(ref log_file_arg) = cli.log_file {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        let log_path = if log_file_arg == "DEFAULT" {
            PathBuf::from(&home).join(".thingbus/logs/broker.log")
        } else {
            PathBuf::from(log_file_arg)
        };

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open log file {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let config = BrokerConfig {
        poll_interval: Duration::from_millis(cli.poll_interval_ms.max(1)),
        max_connections: Some(cli.max_connections),
        ..BrokerConfig::with_endpoint(cli.address.clone())
    };

    let mut broker = Broker::start(config)
        .await
        .with_context(|| format!("failed to start broker on {}", cli.address))?;

    broker.add_object("calc", Calculator).await?;
    broker.add_object("locked_calc", LockedCalculator::default()).await?;

    println!();
    println!("  Thingbus broker running on {}", broker.endpoint());
    for name in broker.object_names().await {
        println!("    shared: {name}");
    }
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("Shutting down...");
    broker.stop().await;
    println!("  Broker stopped.");

    Ok(())
}
