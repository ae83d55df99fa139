//! Persistence gateway for the relational store.
//!
//! # Module Architecture
//!
//! ```text
//! store/
//! ├── gateway.rs - schema bootstrap and parameterized writes (rusqlite)
//! └── worker.rs  - store actor task and the handle the runner talks to
//! ```
//!
//! The SQLite connection is a single shared resource opened once for the
//! process lifetime. It lives on one dedicated worker task; everything else
//! talks to it through [`worker::StoreHandle`], which serializes writes and
//! bounds each one with a timeout so the receive loop can never be wedged
//! by a slow store.
//!
//! All statements bind entity field values as parameters. Attacker-chosen
//! strings (sensor names, units) never reach statement text.

pub mod gateway;
pub mod worker;

use std::time::Duration;

use thiserror::Error;

pub use gateway::{init_schema, open, open_in_memory, readings_series, write_entities, ReadingRow};
pub use worker::{spawn_store_worker, StoreHandle};

/// Failures of the persistence gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected or failed a statement.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A reading referenced a sensor row that does not exist in the store.
    ///
    /// This surfaces when the in-memory registry and the store diverge,
    /// e.g. after a registry-only restart against a populated database.
    #[error("reading references sensor absent from store: {0}")]
    ForeignKeyViolation(String),

    /// The write did not complete within the configured bound.
    #[error("store write timed out after {0:?}")]
    Timeout(Duration),

    /// The store worker task has shut down.
    #[error("store worker is no longer running")]
    WorkerGone,
}
