//! Schema bootstrap and parameterized entity writes.

use rusqlite::{params, Connection, TransactionBehavior};
use tracing::debug;

use super::StoreError;
use crate::model::{Device, Entity, Reading, Sensor};

/// Opens a file-backed database with foreign keys enforced.
pub fn open(path: &str) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    // SQLite does not enforce foreign keys unless asked, per connection.
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

/// Opens an in-memory database, used by tests.
pub fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

/// Applies the three-table schema. Idempotent, safe to run on every start.
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS Devices (
            device_address TEXT PRIMARY KEY,
            device_type TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS Sensors (
            sensor_address TEXT PRIMARY KEY,
            device_address TEXT NOT NULL REFERENCES Devices(device_address),
            sensor_name TEXT NOT NULL,
            sensor_description TEXT NOT NULL,
            unit TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS Readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sensor_address TEXT NOT NULL REFERENCES Sensors(sensor_address),
            data_value REAL NOT NULL,
            recorded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    Ok(())
}

/// Idempotent device registration: a second registration for the same
/// address is a silent no-op and never overwrites the stored row.
pub fn upsert_device(conn: &Connection, device: &Device) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO Devices (device_address, device_type) VALUES (?1, ?2)",
        params![device.address(), device.device_type()],
    )?;
    Ok(())
}

/// Idempotent sensor registration, keyed by sensor address.
pub fn upsert_sensor(conn: &Connection, sensor: &Sensor) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO Sensors
            (sensor_address, device_address, sensor_name, sensor_description, unit)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            sensor.address(),
            sensor.device_address(),
            sensor.name(),
            sensor.description(),
            sensor.unit(),
        ],
    )?;
    Ok(())
}

/// Appends one reading row; the timestamp comes from the store's
/// CURRENT_TIMESTAMP default, never from the producer.
pub fn insert_reading(conn: &Connection, reading: &Reading) -> Result<(), StoreError> {
    let result = conn.execute(
        "INSERT INTO Readings (sensor_address, data_value) VALUES (?1, ?2)",
        params![reading.sensor_address(), reading.value()],
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_foreign_key_violation(&e) => Err(StoreError::ForeignKeyViolation(
            reading.sensor_address().to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// Persists one message's write-set in a single transaction.
///
/// A device packet carrying several sensors lands all-or-nothing; on any
/// failure the transaction rolls back and the message counts as lost.
pub fn write_entities(conn: &mut Connection, entities: &[Entity]) -> Result<(), StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for entity in entities {
        match entity {
            Entity::Device(device) => upsert_device(&tx, device)?,
            Entity::Sensor(sensor) => upsert_sensor(&tx, sensor)?,
            Entity::Reading(reading) => insert_reading(&tx, reading)?,
        }
    }
    tx.commit()?;
    debug!(count = entities.len(), "persisted write-set");
    Ok(())
}

/// One row of the stored time series.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRow {
    pub sensor_address: String,
    pub data_value: f64,
    pub recorded_at: String,
}

/// Reads the full time series in wall-clock arrival order.
///
/// Consumed by the reporting binary; the ingestion pipeline itself never
/// reads the store.
pub fn readings_series(conn: &Connection) -> Result<Vec<ReadingRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT sensor_address, data_value, recorded_at
         FROM Readings
         ORDER BY recorded_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ReadingRow {
                sensor_address: row.get(0)?,
                data_value: row.get(1)?,
                recorded_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Connection {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn device() -> Device {
        Device::new("AA:BB", "ESP32").unwrap()
    }

    fn sensor(dev: &Device) -> Sensor {
        Sensor::new("AA:BB:01", dev, "Temp", "Ambient", "C").unwrap()
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn init_schema_is_idempotent() {
        let conn = store();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn duplicate_device_upsert_leaves_one_row() {
        let conn = store();
        upsert_device(&conn, &device()).unwrap();
        upsert_device(&conn, &device()).unwrap();
        assert_eq!(count(&conn, "Devices"), 1);
    }

    #[test]
    fn later_registration_never_overwrites() {
        let conn = store();
        upsert_device(&conn, &device()).unwrap();
        let later = Device::new("AA:BB", "ESP8266").unwrap();
        upsert_device(&conn, &later).unwrap();
        let kept: String = conn
            .query_row(
                "SELECT device_type FROM Devices WHERE device_address = ?1",
                ["AA:BB"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(kept, "ESP32");
    }

    #[test]
    fn sensor_row_is_keyed_to_its_device() {
        let conn = store();
        let dev = device();
        upsert_device(&conn, &dev).unwrap();
        upsert_sensor(&conn, &sensor(&dev)).unwrap();
        let owner: String = conn
            .query_row(
                "SELECT device_address FROM Sensors WHERE sensor_address = ?1",
                ["AA:BB:01"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(owner, "AA:BB");
    }

    #[test]
    fn reading_gets_server_assigned_timestamp() {
        let conn = store();
        let dev = device();
        let sen = sensor(&dev);
        upsert_device(&conn, &dev).unwrap();
        upsert_sensor(&conn, &sen).unwrap();
        insert_reading(&conn, &Reading::new(&sen, 21.5)).unwrap();

        let series = readings_series(&conn).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].sensor_address, "AA:BB:01");
        assert_eq!(series[0].data_value, 21.5);
        assert!(!series[0].recorded_at.is_empty());
    }

    #[test]
    fn reading_for_absent_sensor_is_a_foreign_key_violation() {
        let conn = store();
        let dev = device();
        let ghost = Sensor::new("ZZ:ZZ", &dev, "Ghost", "Nowhere", "?").unwrap();
        let reading = Reading::new(&ghost, 1.0);
        match insert_reading(&conn, &reading) {
            Err(StoreError::ForeignKeyViolation(addr)) => assert_eq!(addr, "ZZ:ZZ"),
            other => panic!("expected ForeignKeyViolation, got {other:?}"),
        }
        assert_eq!(count(&conn, "Readings"), 0);
    }

    #[test]
    fn hostile_field_values_are_stored_verbatim() {
        // Bound parameters must neutralize quoting and injection attempts.
        let conn = store();
        let dev = Device::new("AA:BB", r#"ESP32"); DROP TABLE Devices; --"#).unwrap();
        upsert_device(&conn, &dev).unwrap();
        let hostile = Sensor::new("AA:BB:01", &dev, r#"Temp" 'n' quotes"#, "desc", "C").unwrap();
        upsert_sensor(&conn, &hostile).unwrap();

        assert_eq!(count(&conn, "Devices"), 1);
        let name: String = conn
            .query_row(
                "SELECT sensor_name FROM Sensors WHERE sensor_address = ?1",
                ["AA:BB:01"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, r#"Temp" 'n' quotes"#);
    }

    #[test]
    fn write_set_lands_all_or_nothing() {
        let mut conn = store();
        let dev = device();
        let sen = sensor(&dev);
        // A reading for a sensor that is not part of the write-set makes the
        // batch fail; the device and sensor rows must roll back with it.
        let ghost = Sensor::new("ZZ:ZZ", &dev, "Ghost", "Nowhere", "?").unwrap();
        let entities = vec![
            Entity::Device(dev.clone()),
            Entity::Sensor(sen),
            Entity::Reading(Reading::new(&ghost, 1.0)),
        ];
        assert!(write_entities(&mut conn, &entities).is_err());
        assert_eq!(count(&conn, "Devices"), 0);
        assert_eq!(count(&conn, "Sensors"), 0);
        assert_eq!(count(&conn, "Readings"), 0);
    }

    #[test]
    fn round_trip_device_with_many_sensors() {
        let mut conn = store();
        let dev = device();
        let mut entities = vec![Entity::Device(dev.clone())];
        for i in 0..32 {
            let s = Sensor::new(format!("AA:BB:{i:02}"), &dev, "S", "gen", "x").unwrap();
            entities.push(Entity::Sensor(s));
        }
        write_entities(&mut conn, &entities).unwrap();

        let back: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM Sensors WHERE device_address = ?1",
                ["AA:BB"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(back, 32);
    }
}
