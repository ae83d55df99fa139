//! Packet decoding, classification and validation.
//!
//! One inbound MQTT payload is one packet. The dispatcher decodes the JSON
//! body, classifies it by its `packet_type` discriminator and turns it into
//! an ordered write-set of entities for the store. It mutates only the
//! registry, never the store, which keeps classification testable without a
//! database or a broker.
//!
//! Two packet shapes are recognized:
//!
//! ```text
//! {"packet_type":"Device","device_address":..,"device_type":..,"sensors":[..]}
//! {"packet_type":"SensorReading","sensor_address":..,"data_value":..}
//! ```

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{Device, Entity, ModelError, Reading, Sensor};
use crate::registry::{EntityRegistry, Registration};

/// Classified packet failures.
///
/// None of these are fatal: the receive loop logs the failure, drops the
/// message and keeps going.
#[derive(Debug, Error)]
pub enum PacketError {
    /// The payload is not well-formed JSON.
    #[error("payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// The `packet_type` key is missing or names no known variant.
    #[error("unrecognized packet type: {0}")]
    UnrecognizedPacketType(String),

    /// A required field is missing or empty.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// A reading references a sensor address that was never registered.
    ///
    /// Kept distinct from [`PacketError::Malformed`] because it points at a
    /// registration-ordering problem on the producer side, not a schema
    /// problem in the payload.
    #[error("reading references unknown sensor: {0}")]
    UnknownSensor(String),
}

impl From<ModelError> for PacketError {
    fn from(err: ModelError) -> Self {
        PacketError::Malformed(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct DevicePacket {
    device_address: String,
    device_type: String,
    sensors: Vec<SensorDescriptor>,
}

#[derive(Debug, Deserialize)]
struct SensorDescriptor {
    sensor_address: String,
    sensor_name: String,
    sensor_description: String,
    unit: String,
}

#[derive(Debug, Deserialize)]
struct ReadingPacket {
    sensor_address: String,
    data_value: f64,
}

/// Decodes one payload and returns the entities to persist.
///
/// The returned write-set contains only entities the registry had not seen
/// before; entities that were already registered are skipped silently so
/// repeated registrations never produce redundant store writes. For a
/// reading packet the set is exactly one [`Entity::Reading`].
pub fn dispatch(payload: &[u8], registry: &mut EntityRegistry) -> Result<Vec<Entity>, PacketError> {
    let value: Value = serde_json::from_slice(payload)?;

    let packet_type = value
        .get("packet_type")
        .and_then(Value::as_str)
        .ok_or_else(|| PacketError::UnrecognizedPacketType("<missing>".to_string()))?
        .to_string();

    match packet_type.as_str() {
        "Device" => dispatch_device(value, registry),
        "SensorReading" => dispatch_reading(value, registry),
        other => Err(PacketError::UnrecognizedPacketType(other.to_string())),
    }
}

fn dispatch_device(value: Value, registry: &mut EntityRegistry) -> Result<Vec<Entity>, PacketError> {
    let packet: DevicePacket =
        serde_json::from_value(value).map_err(|e| PacketError::Malformed(e.to_string()))?;

    let device = Device::new(packet.device_address, packet.device_type)?;

    // Validate every descriptor before touching the registry so a malformed
    // packet leaves no partial registrations behind.
    let mut sensors = Vec::with_capacity(packet.sensors.len());
    for descriptor in packet.sensors {
        sensors.push(Sensor::new(
            descriptor.sensor_address,
            &device,
            descriptor.sensor_name,
            descriptor.sensor_description,
            descriptor.unit,
        )?);
    }

    let mut write_set = Vec::new();
    if registry.register_device(device.clone()) == Registration::New {
        write_set.push(Entity::Device(device));
    }
    for sensor in sensors {
        if registry.register_sensor(sensor.clone()) == Registration::New {
            write_set.push(Entity::Sensor(sensor));
        }
    }
    Ok(write_set)
}

fn dispatch_reading(value: Value, registry: &mut EntityRegistry) -> Result<Vec<Entity>, PacketError> {
    let packet: ReadingPacket =
        serde_json::from_value(value).map_err(|e| PacketError::Malformed(e.to_string()))?;

    let sensor = registry
        .lookup_sensor(&packet.sensor_address)
        .ok_or_else(|| PacketError::UnknownSensor(packet.sensor_address.clone()))?;

    Ok(vec![Entity::Reading(Reading::new(sensor, packet.data_value))])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(registry: &mut EntityRegistry) {
        let payload = br#"{"packet_type":"Device","device_address":"AA:BB","device_type":"ESP32",
            "sensors":[{"sensor_address":"AA:BB:01","sensor_name":"Temp",
            "sensor_description":"Ambient","unit":"C"}]}"#;
        dispatch(payload, registry).unwrap();
    }

    #[test]
    fn device_packet_yields_device_then_sensors() {
        let mut registry = EntityRegistry::new();
        let payload = br#"{"packet_type":"Device","device_address":"AA:BB","device_type":"ESP32",
            "sensors":[{"sensor_address":"AA:BB:01","sensor_name":"Temp",
            "sensor_description":"Ambient","unit":"C"}]}"#;
        let entities = dispatch(payload, &mut registry).unwrap();

        assert_eq!(entities.len(), 2);
        match &entities[0] {
            Entity::Device(d) => {
                assert_eq!(d.address(), "AA:BB");
                assert_eq!(d.device_type(), "ESP32");
            }
            other => panic!("expected device first, got {other:?}"),
        }
        match &entities[1] {
            Entity::Sensor(s) => {
                assert_eq!(s.address(), "AA:BB:01");
                assert_eq!(s.device_address(), "AA:BB");
                assert_eq!(s.unit(), "C");
            }
            other => panic!("expected sensor second, got {other:?}"),
        }
    }

    #[test]
    fn repeated_device_packet_yields_empty_write_set() {
        let mut registry = EntityRegistry::new();
        registered(&mut registry);
        let payload = br#"{"packet_type":"Device","device_address":"AA:BB","device_type":"ESP32",
            "sensors":[{"sensor_address":"AA:BB:01","sensor_name":"Temp",
            "sensor_description":"Ambient","unit":"C"}]}"#;
        let entities = dispatch(payload, &mut registry).unwrap();
        assert!(entities.is_empty());
    }

    #[test]
    fn device_packet_with_empty_sensor_list_is_valid() {
        let mut registry = EntityRegistry::new();
        let payload =
            br#"{"packet_type":"Device","device_address":"CC:DD","device_type":"ESP32","sensors":[]}"#;
        let entities = dispatch(payload, &mut registry).unwrap();
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn reading_for_known_sensor_resolves() {
        let mut registry = EntityRegistry::new();
        registered(&mut registry);
        let payload = br#"{"packet_type":"SensorReading","sensor_address":"AA:BB:01","data_value":21.5}"#;
        let entities = dispatch(payload, &mut registry).unwrap();
        assert_eq!(entities.len(), 1);
        match &entities[0] {
            Entity::Reading(r) => {
                assert_eq!(r.sensor_address(), "AA:BB:01");
                assert_eq!(r.value(), 21.5);
            }
            other => panic!("expected reading, got {other:?}"),
        }
    }

    #[test]
    fn reading_for_unknown_sensor_is_rejected() {
        let mut registry = EntityRegistry::new();
        let payload = br#"{"packet_type":"SensorReading","sensor_address":"ZZ:ZZ","data_value":1.0}"#;
        match dispatch(payload, &mut registry) {
            Err(PacketError::UnknownSensor(addr)) => assert_eq!(addr, "ZZ:ZZ"),
            other => panic!("expected UnknownSensor, got {other:?}"),
        }
    }

    #[test]
    fn unknown_packet_type_is_classified() {
        let mut registry = EntityRegistry::new();
        let payload = br#"{"packet_type":"Weather","temp":20}"#;
        match dispatch(payload, &mut registry) {
            Err(PacketError::UnrecognizedPacketType(t)) => assert_eq!(t, "Weather"),
            other => panic!("expected UnrecognizedPacketType, got {other:?}"),
        }
    }

    #[test]
    fn missing_packet_type_is_classified() {
        let mut registry = EntityRegistry::new();
        let payload = br#"{"device_address":"AA:BB"}"#;
        assert!(matches!(
            dispatch(payload, &mut registry),
            Err(PacketError::UnrecognizedPacketType(_))
        ));
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let mut registry = EntityRegistry::new();
        assert!(matches!(
            dispatch(b"not json", &mut registry),
            Err(PacketError::Decode(_))
        ));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let mut registry = EntityRegistry::new();
        // No device_type.
        let payload = br#"{"packet_type":"Device","device_address":"AA:BB","sensors":[]}"#;
        assert!(matches!(
            dispatch(payload, &mut registry),
            Err(PacketError::Malformed(_))
        ));
        // No data_value.
        let payload = br#"{"packet_type":"SensorReading","sensor_address":"AA:BB:01"}"#;
        assert!(matches!(
            dispatch(payload, &mut registry),
            Err(PacketError::Malformed(_))
        ));
    }

    #[test]
    fn empty_descriptor_field_is_malformed() {
        let mut registry = EntityRegistry::new();
        let payload = br#"{"packet_type":"Device","device_address":"AA:BB","device_type":"ESP32",
            "sensors":[{"sensor_address":"AA:BB:01","sensor_name":"",
            "sensor_description":"Ambient","unit":"C"}]}"#;
        assert!(matches!(
            dispatch(payload, &mut registry),
            Err(PacketError::Malformed(_))
        ));
        // The device must not be left half-registered by the failing packet.
        let reading = br#"{"packet_type":"SensorReading","sensor_address":"AA:BB:01","data_value":1.0}"#;
        assert!(matches!(
            dispatch(reading, &mut registry),
            Err(PacketError::UnknownSensor(_))
        ));
    }

    #[test]
    fn non_numeric_data_value_is_malformed() {
        let mut registry = EntityRegistry::new();
        registered(&mut registry);
        let payload = br#"{"packet_type":"SensorReading","sensor_address":"AA:BB:01","data_value":"fast"}"#;
        assert!(matches!(
            dispatch(payload, &mut registry),
            Err(PacketError::Malformed(_))
        ));
    }
}
