//! wallet-kms
//!
//! Custodial key management and transaction signing, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http ──▶ wallet registry ──▶ secrets (vault | local)
//!               │                                  ▲
//!               ├──▶ blockchain tx builder ──▶ signing (EIP-712, messages)
//!               │         │        │
//!               │         ▼        ▼
//!               │     platform   chain RPC (failover)
//!               │         ▲
//!               └──▶ relay (gasless)
//!
//!   scheduler ──▶ platform queues ──▶ tx builder / wallet registry
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use wallet_kms::config::{load_config, KmsConfig};
use wallet_kms::lifecycle::{bootstrap, signals, Shutdown};
use wallet_kms::observability::{logging, metrics};
use wallet_kms::HttpServer;

#[derive(Parser)]
#[command(name = "wallet-kms")]
#[command(about = "Custodial wallet key-management service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/wallet-kms.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config: KmsConfig = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            std::process::exit(2);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wallet-kms starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = match bootstrap(&config).await {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(shutdown.clone());

    let scheduler = services
        .scheduler(config.scheduler.clone())
        .spawn(shutdown.subscribe());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        backend = ?config.secrets.backend,
        scheduler_interval_secs = config.scheduler.interval_secs,
        "Listening for connections"
    );

    let server = HttpServer::new(services.app_state(), config.listener.clone(), &config.timeouts);
    server.run(listener, shutdown.subscribe()).await?;

    // The server only returns once shutdown began; give the scheduler the same grace.
    shutdown.trigger();
    let grace = Duration::from_secs(config.timeouts.shutdown_secs);
    if tokio::time::timeout(grace, scheduler).await.is_err() {
        tracing::warn!(grace_secs = grace.as_secs(), "Scheduler did not stop in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
