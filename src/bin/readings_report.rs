//! Dumps the stored readings as a time series, oldest first.
//!
//! Read-only companion to the ingestion daemon; prints one line per
//! reading so the output can be piped into whatever does the actual
//! charting.

use chrono::NaiveDateTime;
use clap::Parser;
use color_eyre::Result;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use telemetry_gate::store::{open, readings_series};

/// Print the Readings table ordered by recorded_at.
#[derive(Parser, Debug)]
#[command(name = "readings-report", version, about)]
struct Args {
    /// Path of the database file to read
    #[arg(default_value = "iot.db")]
    db_path: String,

    /// Emit comma-separated values instead of the aligned table
    #[arg(long)]
    csv: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_target(false)
        .init();

    let args = Args::parse();
    let conn = open(&args.db_path)?;
    let series = readings_series(&conn)?;

    if args.csv {
        println!("recorded_at,sensor_address,data_value");
        for row in series {
            // Full timestamps for machine consumers.
            println!("{},{},{}", row.recorded_at, row.sensor_address, row.data_value);
        }
        return Ok(());
    }

    for row in series {
        // SQLite's CURRENT_TIMESTAMP format, shortened for the table view;
        // rows written by other tools may not parse, print those as-is.
        let recorded_at =
            match NaiveDateTime::parse_from_str(&row.recorded_at, "%Y-%m-%d %H:%M:%S") {
                Ok(ts) => ts.format("%m/%d %H:%M").to_string(),
                Err(_) => {
                    warn!("unparseable timestamp: {}", row.recorded_at);
                    row.recorded_at.clone()
                }
            };
        println!("{recorded_at}  {:<20} {:>12}", row.sensor_address, row.data_value);
    }
    Ok(())
}
