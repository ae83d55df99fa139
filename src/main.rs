use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use telemetry_gate::config::GateConfig;
use telemetry_gate::ingest::run_ingest;
use telemetry_gate::store::{init_schema, open, spawn_store_worker};

/// Telemetry ingestion daemon: MQTT in, SQLite out.
#[derive(Parser, Debug)]
#[command(name = "telemetry-gate", version, about)]
struct Args {
    /// Path to the configuration file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let args = Args::parse();

    let config = GateConfig::load(args.config.as_deref()).await?;

    // One connection for the process lifetime; the schema bootstrap is
    // idempotent so a pre-initialized store passes through unchanged.
    let conn = open(&config.store.db_path)?;
    init_schema(&conn)?;
    info!("store ready at {}", config.store.db_path);

    let write_timeout = Duration::from_millis(config.store.write_timeout_ms);
    let (store, store_worker) = spawn_store_worker(conn, write_timeout);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingest = tokio::spawn(run_ingest(config, store, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, shutting down");
    let _ = shutdown_tx.send(true);

    match ingest.await {
        Ok(Ok(())) => info!("receive loop stopped"),
        Ok(Err(e)) => error!("receive loop failed: {e}"),
        Err(e) => error!("ingest task panicked: {e}"),
    }

    // All store handles are gone once the runner returns; the worker drains
    // its queue and closes the connection.
    store_worker.await?;
    info!("gateway stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
