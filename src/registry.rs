//! Process-local registry of known devices and sensors.
//!
//! The registry exists to make registration idempotent and to let reading
//! packets resolve a sensor address without a store round-trip. It is a
//! correctness cache, not a performance cache: it starts empty, grows with
//! every distinct address seen, and is never pruned during the process's
//! lifetime. Across restarts the relational store is the durable source of
//! truth; re-registration of already-stored entities is a store-level no-op.

use std::collections::HashMap;

use crate::model::{Device, Sensor};

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The address was not known before; the entity was stored.
    New,
    /// The address was already registered; the stored value is unchanged.
    Existing,
}

/// Mapping of known device and sensor addresses to their entities.
///
/// Owned by the subscription runner and handed to the dispatcher by
/// mutable reference, so each test can run against a fresh registry.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    devices: HashMap<String, Device>,
    sensors: HashMap<String, Sensor>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device, first registration wins.
    pub fn register_device(&mut self, device: Device) -> Registration {
        if self.devices.contains_key(device.address()) {
            return Registration::Existing;
        }
        self.devices.insert(device.address().to_string(), device);
        Registration::New
    }

    /// Registers a sensor, first registration wins.
    pub fn register_sensor(&mut self, sensor: Sensor) -> Registration {
        if self.sensors.contains_key(sensor.address()) {
            return Registration::Existing;
        }
        self.sensors.insert(sensor.address().to_string(), sensor);
        Registration::New
    }

    /// Resolves a sensor address for a reading packet.
    ///
    /// A miss means the reading references a sensor the process has never
    /// seen register; the caller treats that as an error, never as an
    /// implicit registration.
    pub fn lookup_sensor(&self, address: &str) -> Option<&Sensor> {
        self.sensors.get(address)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }
}
