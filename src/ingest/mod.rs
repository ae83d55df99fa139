//! # Ingestion Module
//!
//! Owns the MQTT connection lifecycle and wires inbound messages through
//! the dispatcher → registry → store chain.
//!
//! ```text
//! ingest/
//! └── runner.rs - statum-typed connection lifecycle and receive loop
//! ```
//!
//! No packet failure is fatal here: decode errors, unknown packet types,
//! malformed packets, unknown sensors and store failures are all logged and
//! the loop moves on to the next message. Only a shutdown signal ends the
//! run.

pub mod runner;

pub use runner::{run_ingest, IngestError};
