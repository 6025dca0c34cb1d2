//! Algorand account watcher
//!
//! Main entry point. Starts the background poll scheduler and the HTTP
//! control API on the same tokio runtime; Ctrl-C stops both.
//!
//! Usage:
//!   cargo run --bin algo-watcher -- --port 5000
//!   cargo run --bin algo-watcher -- --config watcher.toml
//!   cargo run --bin algo-watcher -- --once --watch <ADDRESS>

use algo_watcher::api::{self, AppState};
use algo_watcher::config::{load_config, WatcherConfig};
use algo_watcher::{AccountClient, AlgodClient, PollScheduler, SnapshotStore, WatchRegistry};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Algorand account watcher
#[derive(Parser)]
#[command(name = "algo-watcher")]
struct Args {
    /// TOML config file (otherwise configuration is read from the environment)
    #[arg(short, long, env = "WATCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the poll interval (seconds)
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Addresses to watch from startup (repeatable)
    #[arg(short, long)]
    watch: Vec<String>,

    /// Run a single poll cycle, print the snapshots and exit
    #[arg(long)]
    once: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn resolve_config(args: &Args) -> Result<WatcherConfig> {
    let mut config = match &args.config {
        Some(path) => WatcherConfig::load(path)?,
        None => load_config()?,
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(secs) = args.poll_interval {
        config.poll_interval_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!("===========================================");
    info!("   Algorand Account Watcher");
    info!("===========================================");

    let config = resolve_config(&args)?;
    info!("Configuration loaded");
    info!("  algod: {}", config.algod_url);
    info!("  Poll interval: {}s", config.poll_interval_secs);
    info!("  Fetch timeout: {}s", config.fetch_timeout_secs);

    let algod = AlgodClient::new(&config.algod_url, &config.algod_token, config.fetch_timeout())?;
    match algod.node_status().await {
        Ok(status) => info!(
            "Connected to algod, last round: {}",
            status.get("last-round").cloned().unwrap_or_default()
        ),
        // Not fatal: the node may come up later and every cycle retries
        Err(e) => warn!("algod status check failed: {}", e.log_detail()),
    }
    let client: Arc<dyn AccountClient> = Arc::new(algod);

    let registry = WatchRegistry::new();
    let store = SnapshotStore::new();
    for address in &args.watch {
        registry.add(address.clone());
        info!("Started watching address {}", address);
    }

    let scheduler = PollScheduler::new(
        Arc::clone(&client),
        registry.clone(),
        store.clone(),
        config.poll_interval(),
        config.fetch_timeout(),
    )
    .with_stats_log_every(config.stats_log_every);

    if args.once {
        let report = scheduler.run_once().await;
        info!(
            "Single cycle: {} polled, {} stored, {} failed",
            report.polled,
            report.stored,
            report.failures.len()
        );
        let snapshots: Vec<_> = store.list_all();
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    let state = AppState {
        registry,
        store,
        client,
        fetch_timeout: config.fetch_timeout(),
        stats: scheduler.stats_handle(),
        scheduler_state: scheduler.watch_state(),
    };

    let cancel = CancellationToken::new();
    let scheduler_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let listen_addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", listen_addr))?;
    info!("Control API listening on {}", listen_addr);

    let shutdown = cancel.clone();
    let served = axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Received Ctrl-C, shutting down...");
            shutdown.cancel();
        })
        .await;

    // Server may also exit on its own error; stop the scheduler either way
    cancel.cancel();
    if let Err(e) = scheduler_task.await {
        error!("Poll scheduler task panicked: {}", e);
    }

    served.context("Control API server failed")?;
    info!("Shutdown complete");
    Ok(())
}
