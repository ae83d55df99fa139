//! Telemetry ingestion gateway.
//!
//! Subscribes to device telemetry on an MQTT broker, classifies each
//! message into device registrations, sensor registrations or sensor
//! readings, deduplicates registrations through a process-local registry
//! and persists everything into a foreign-key-linked SQLite store.
//!
//! ```text
//! broker ──► ingest (decode/classify) ──► registry (dedup/resolve)
//!                                             │
//!                                             ▼
//!                                    store (one txn per message)
//! ```

pub mod config;
pub mod ingest;
pub mod model;
pub mod packet;
pub mod registry;
pub mod store;
