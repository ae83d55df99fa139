//! Subscription runner with compile-time lifecycle safety via statum.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Connected ──► Receiving ⟲
//!                  (subscribe)      │
//!                                   └─ transport error: backoff, re-poll,
//!                                      re-subscribe on the next ConnAck
//! ```
//!
//! The event loop re-dials the broker on its own; the runner adds an
//! exponential backoff between attempts (1 s doubling up to 60 s, reset
//! once a connection is acknowledged) so an unreachable broker is retried
//! patiently instead of terminating the process.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use statum::{machine, state};
use thiserror::Error;
use tokio::select;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::GateConfig;
use crate::packet::{self, PacketError};
use crate::registry::EntityRegistry;
use crate::store::StoreHandle;

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Runner failures that end the ingestion task.
///
/// Everything message-scoped is handled inside the receive loop; only a
/// broken client request channel or a missing transport handle surface
/// here.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The client's request channel to the event loop is gone.
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Internal invariant: a state required a transport that was not built.
    #[error("transport not initialized: {0}")]
    NotConnected(&'static str),
}

/// States of the subscription runner lifecycle.
#[state]
#[derive(Debug, Clone)]
pub enum RunnerState {
    Disconnected,
    Connected,
    Receiving,
}

/// Subscription runner with compile-time state safety.
///
/// Owns the entity registry for the life of the process; the registry
/// survives broker reconnects, so re-registration after a reconnect stays
/// an in-memory no-op.
#[machine]
pub struct IngestRunner<S: RunnerState> {
    config: GateConfig,
    registry: EntityRegistry,
    store: StoreHandle,
    shutdown: watch::Receiver<bool>,
    client: Option<AsyncClient>,
    events: Option<EventLoop>,
    backoff: Duration,
    resubscribe_needed: bool,
}

impl IngestRunner<Disconnected> {
    pub fn create(config: GateConfig, store: StoreHandle, shutdown: watch::Receiver<bool>) -> Self {
        Self::new(
            config,
            EntityRegistry::new(),
            store,
            shutdown,
            None, // client
            None, // events
            BACKOFF_INITIAL,
            false,
        )
    }

    /// Builds the transport handles and transitions to Connected.
    ///
    /// The TCP dial itself happens lazily inside the event loop, so this
    /// step cannot fail; connection errors surface in the receive loop.
    pub fn connect(mut self) -> IngestRunner<Connected> {
        let client_id = self.config.client_id();
        info!(
            "connecting to {}:{} as {}",
            self.config.broker.host, self.config.broker.port, client_id
        );

        let mut options = MqttOptions::new(
            client_id,
            self.config.broker.host.clone(),
            self.config.broker.port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.broker.keepalive_secs));

        let (client, events) = AsyncClient::new(options, 64);
        self.client = Some(client);
        self.events = Some(events);
        self.transition()
    }
}

impl IngestRunner<Connected> {
    /// Subscribes the configured topics and transitions to Receiving.
    pub async fn subscribe(self) -> Result<IngestRunner<Receiving>, IngestError> {
        let client = self
            .client
            .as_ref()
            .ok_or(IngestError::NotConnected("client"))?;
        for topic in &self.config.topics {
            info!("subscribing to {} at qos {}", topic.name, topic.qos);
            client.subscribe(&topic.name, qos_level(topic.qos)).await?;
        }
        Ok(self.transition())
    }
}

impl IngestRunner<Receiving> {
    /// Receive loop: one message in, one dispatch, one store write-set out.
    ///
    /// Returns when the shutdown signal fires; any in-flight message is
    /// finished first.
    pub async fn run(mut self) -> Result<(), IngestError> {
        let mut events = self
            .events
            .take()
            .ok_or(IngestError::NotConnected("event loop"))?;
        let mut shutdown = self.shutdown.clone();

        loop {
            select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        info!("shutdown requested, leaving receive loop");
                        return Ok(());
                    }
                }
                event = events.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.process_message(&publish.topic, &publish.payload).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        self.backoff = BACKOFF_INITIAL;
                        if self.resubscribe_needed {
                            // Subscriptions do not survive a fresh broker
                            // session, re-issue them on every reconnect.
                            self.resubscribe_needed = false;
                            if let Err(e) = self.resubscribe().await {
                                error!("failed to re-subscribe after reconnect: {e}");
                                return Err(e);
                            }
                        } else {
                            info!("broker acknowledged connection");
                        }
                    }
                    Ok(event) => debug!("transport event: {event:?}"),
                    Err(e) => {
                        warn!(
                            "transport error: {e}, retrying in {:.0?}",
                            self.backoff
                        );
                        self.resubscribe_needed = true;
                        if backoff_or_shutdown(self.backoff, &mut shutdown).await {
                            info!("shutdown requested during reconnect backoff");
                            return Ok(());
                        }
                        self.backoff = next_backoff(self.backoff);
                    }
                }
            }
        }
    }

    async fn resubscribe(&mut self) -> Result<(), IngestError> {
        let client = self
            .client
            .as_ref()
            .ok_or(IngestError::NotConnected("client"))?;
        for topic in &self.config.topics {
            info!("re-subscribing to {} at qos {}", topic.name, topic.qos);
            client.subscribe(&topic.name, qos_level(topic.qos)).await?;
        }
        Ok(())
    }

    /// Classifies one payload and persists its write-set.
    ///
    /// At-most-once per message: a failed store write is logged as lost,
    /// never retried.
    async fn process_message(&mut self, topic: &str, payload: &[u8]) {
        match packet::dispatch(payload, &mut self.registry) {
            Ok(entities) if entities.is_empty() => {
                debug!("message from {topic} already registered, nothing to persist");
            }
            Ok(entities) => {
                let count = entities.len();
                match self.store.write_entities(entities).await {
                    Ok(()) => debug!("persisted {count} entities from {topic}"),
                    Err(e) => error!("message from {topic} lost, store write failed: {e}"),
                }
            }
            Err(PacketError::UnknownSensor(addr)) => {
                // Actionable: the producer sent readings before (or without)
                // registering the sensor.
                warn!("dropping reading from {topic} for unknown sensor {addr}");
            }
            Err(e) => warn!("dropping message from {topic}: {e}"),
        }
    }
}

fn qos_level(level: u8) -> QoS {
    // Out-of-range levels are rejected at config load.
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(BACKOFF_CAP)
}

/// Waits out one reconnect delay, cut short by the shutdown signal.
///
/// Returns true when shutdown was requested, so a ctrl-c during a broker
/// outage ends the run immediately instead of after the full backoff.
async fn backoff_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow_and_update(),
        _ = sleep(delay) => false,
    }
}

/// Drives the full runner lifecycle until shutdown.
pub async fn run_ingest(
    config: GateConfig,
    store: StoreHandle,
    shutdown: watch::Receiver<bool>,
) -> Result<(), IngestError> {
    let runner = IngestRunner::create(config, store, shutdown);
    let runner = runner.connect();
    let runner = runner.subscribe().await?;
    runner.run().await
}
