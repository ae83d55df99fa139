//! Store actor task and its handle.
//!
//! The worker owns the only open connection and applies write-sets in the
//! order they arrive, which preserves the pipeline's single-writer model
//! even though the runner and the store live on different tasks. Replies
//! travel back over oneshot channels; the handle bounds each round-trip
//! with the configured write timeout.

use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info};

use super::{gateway, StoreError};
use crate::model::Entity;

/// Commands accepted by the store worker.
#[derive(Debug)]
enum StoreCommand {
    WriteEntities {
        entities: Vec<Entity>,
        respond_to: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Cloneable handle to the store worker.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
    write_timeout: Duration,
}

impl StoreHandle {
    /// Persists one message's write-set, waiting at most the configured
    /// write timeout for the store to confirm.
    ///
    /// The timeout bounds both sides of the round-trip: enqueueing the
    /// command when the worker's queue is full, and waiting for the reply.
    pub async fn write_entities(&self, entities: Vec<Entity>) -> Result<(), StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.tx
            .send_timeout(
                StoreCommand::WriteEntities { entities, respond_to },
                self.write_timeout,
            )
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => StoreError::Timeout(self.write_timeout),
                SendTimeoutError::Closed(_) => StoreError::WorkerGone,
            })?;
        match timeout(self.write_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StoreError::WorkerGone),
            Err(_) => Err(StoreError::Timeout(self.write_timeout)),
        }
    }
}

/// Spawns the store worker and returns the handle the runner writes through.
///
/// The worker drains its command queue before exiting, so dropping the last
/// handle after shutdown lets in-flight writes complete before the
/// connection closes.
pub fn spawn_store_worker(
    mut conn: Connection,
    write_timeout: Duration,
) -> (StoreHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<StoreCommand>(64);

    let worker = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                StoreCommand::WriteEntities { entities, respond_to } => {
                    let result = gateway::write_entities(&mut conn, &entities);
                    if let Err(ref e) = result {
                        error!("store write failed: {e}");
                    }
                    if respond_to.send(result).is_err() {
                        // Caller timed out or went away; the write itself
                        // already committed or rolled back.
                        error!("store response receiver dropped");
                    }
                }
            }
        }
        info!("store worker drained, closing connection");
    });

    (
        StoreHandle { tx, write_timeout },
        worker,
    )
}
