//! Entity model for the ingestion pipeline.
//!
//! Three entity kinds flow through the gateway: devices, the sensors
//! attached to them, and timestamped readings produced by those sensors.
//! Constructors validate field presence so that everything downstream
//! (registry, store) only ever sees well-formed entities.

use thiserror::Error;

/// Validation errors raised by entity constructors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// A required string field was empty or missing.
    #[error("required field is empty: {0}")]
    EmptyField(&'static str),
}

/// A physical unit identified by its transport-layer hardware address.
///
/// Devices are immutable once created; a later registration with the same
/// address never overwrites an earlier one (first registration wins, both
/// in the registry and in the store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    address: String,
    device_type: String,
}

impl Device {
    pub fn new(address: impl Into<String>, device_type: impl Into<String>) -> Result<Self, ModelError> {
        let address = address.into();
        let device_type = device_type.into();
        if address.is_empty() {
            return Err(ModelError::EmptyField("device_address"));
        }
        if device_type.is_empty() {
            return Err(ModelError::EmptyField("device_type"));
        }
        Ok(Self { address, device_type })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }
}

/// A measurement source attached to a device.
///
/// The `device_address` reference must resolve to a device that was
/// registered before (or in the same packet as) this sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    address: String,
    device_address: String,
    name: String,
    description: String,
    unit: String,
}

impl Sensor {
    pub fn new(
        address: impl Into<String>,
        device: &Device,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let address = address.into();
        let name = name.into();
        let description = description.into();
        let unit = unit.into();
        if address.is_empty() {
            return Err(ModelError::EmptyField("sensor_address"));
        }
        if name.is_empty() {
            return Err(ModelError::EmptyField("sensor_name"));
        }
        if description.is_empty() {
            return Err(ModelError::EmptyField("sensor_description"));
        }
        if unit.is_empty() {
            return Err(ModelError::EmptyField("unit"));
        }
        Ok(Self {
            address,
            device_address: device.address().to_string(),
            name,
            description,
            unit,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn device_address(&self) -> &str {
        &self.device_address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }
}

/// One numeric observation from a registered sensor.
///
/// The timestamp is assigned by the store at write time, never taken from
/// the producer, so a Reading carries only the sensor reference and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    sensor_address: String,
    value: f64,
}

impl Reading {
    pub fn new(sensor: &Sensor, value: f64) -> Self {
        Self {
            sensor_address: sensor.address().to_string(),
            value,
        }
    }

    pub fn sensor_address(&self) -> &str {
        &self.sensor_address
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Closed set of entity kinds the pipeline persists.
///
/// The dispatcher returns these in registration order (device before its
/// sensors) so the store can replay them into one transaction without
/// tripping foreign keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Device(Device),
    Sensor(Sensor),
    Reading(Reading),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_requires_address_and_type() {
        assert!(Device::new("AA:BB", "ESP32").is_ok());
        assert_eq!(
            Device::new("", "ESP32").unwrap_err(),
            ModelError::EmptyField("device_address")
        );
        assert_eq!(
            Device::new("AA:BB", "").unwrap_err(),
            ModelError::EmptyField("device_type")
        );
    }

    #[test]
    fn sensor_requires_all_descriptor_fields() {
        let dev = Device::new("AA:BB", "ESP32").unwrap();
        assert!(Sensor::new("AA:BB:01", &dev, "Temp", "Ambient", "C").is_ok());
        assert_eq!(
            Sensor::new("", &dev, "Temp", "Ambient", "C").unwrap_err(),
            ModelError::EmptyField("sensor_address")
        );
        assert_eq!(
            Sensor::new("AA:BB:01", &dev, "", "Ambient", "C").unwrap_err(),
            ModelError::EmptyField("sensor_name")
        );
        assert_eq!(
            Sensor::new("AA:BB:01", &dev, "Temp", "", "C").unwrap_err(),
            ModelError::EmptyField("sensor_description")
        );
        assert_eq!(
            Sensor::new("AA:BB:01", &dev, "Temp", "Ambient", "").unwrap_err(),
            ModelError::EmptyField("unit")
        );
    }

    #[test]
    fn sensor_captures_owning_device_address() {
        let dev = Device::new("AA:BB", "ESP32").unwrap();
        let sensor = Sensor::new("AA:BB:01", &dev, "Temp", "Ambient", "C").unwrap();
        assert_eq!(sensor.device_address(), "AA:BB");
    }
}
