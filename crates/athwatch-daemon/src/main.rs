use std::sync::Arc;

use anyhow::{Context, Result};
use athwatch_daemon::bridge::{read_bridge, BridgeTransport};
use athwatch_daemon::config::DaemonConfig;
use athwatch_daemon::daemon::{open_store, Daemon};
use athwatch_daemon::scraper::SnapshotScraper;
use athwatch_models::VerificationMode;
use athwatch_store::RecordStore;
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "athwatch",
    about = "athwatch pipeline daemon - relays new listings to ATH verification bots and forwards qualifying ones to trading bots"
)]
struct Cli {
    /// Path to daemon configuration file
    #[arg(short, long, default_value = "config/athwatch.toml")]
    config: String,

    /// Delete every stored asset record before starting
    #[arg(long)]
    clear_records: bool,

    /// Verification responders to use: both, primary or secondary
    #[arg(long)]
    mode: Option<VerificationMode>,

    /// Log as JSON lines instead of human-readable text
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the bridge protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = dotenv::dotenv() {
        tracing::debug!(error = %e, "No .env file loaded");
    }

    let mut config = DaemonConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;
    if let Some(mode) = cli.mode {
        config.pipeline.verification_mode = mode;
        config.validate().context("Invalid --mode for this configuration")?;
    }

    let store = Arc::new(
        open_store(&config.store)
            .with_context(|| format!("Failed to open record DB: {}", config.store.sqlite_path))?,
    );
    if cli.clear_records {
        let cleared = store.clear().await.context("Failed to clear records")?;
        tracing::info!(cleared, "Record table cleared");
    }

    let transport = Arc::new(BridgeTransport::new(tokio::io::stdout()));
    let scraper = Arc::new(SnapshotScraper::new(&config.scraper.snapshot_path));

    let daemon = Daemon::new(config, store, transport, scraper)?;
    let signals = daemon.signals();

    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    tokio::spawn(read_bridge(
        BufReader::new(tokio::io::stdin()),
        inbound_tx,
        signals.clone(),
    ));

    // Handle shutdown signals
    let stopper = signals.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        stopper.shutdown();
    });

    daemon.run(inbound_rx).await?;

    Ok(())
}
