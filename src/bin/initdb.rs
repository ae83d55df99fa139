//! Applies the gateway schema to a (new or existing) SQLite database.

use clap::Parser;
use color_eyre::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use telemetry_gate::store::{init_schema, open};

/// Create the Devices/Sensors/Readings tables.
#[derive(Parser, Debug)]
#[command(name = "initdb", version, about)]
struct Args {
    /// Path of the database file to initialize
    #[arg(default_value = "iot.db")]
    db_path: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();
    let conn = open(&args.db_path)?;
    init_schema(&conn)?;
    info!("schema applied to {}", args.db_path);
    Ok(())
}
