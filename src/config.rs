//! Gateway configuration, loaded from a TOML file.
//!
//! Missing files fall back to defaults so the gateway stays usable on a
//! fresh host: localhost broker, the stock registration / readings topics
//! at QoS 2, and a database file next to the config.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use tokio::fs::read_to_string;
use tracing::{info, warn};

/// Top-level configuration for the ingestion daemon.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct GateConfig {
    pub broker: BrokerConfig,
    pub topics: Vec<TopicConfig>,
    pub store: StoreConfig,
}

/// Broker connection parameters.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keepalive_secs: u64,
    /// Prefix for the per-process client id; a random suffix is appended on
    /// every start so reconnects present a fresh session to the broker.
    pub client_id_prefix: String,
}

/// One subscription: topic filter plus its quality-of-service level (0-2).
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TopicConfig {
    pub name: String,
    pub qos: u8,
}

/// Store location and the per-write timeout bound.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: String,
    pub write_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            topics: vec![
                // Registration events and the secondary readings stream, as
                // published by the stock firmware.
                TopicConfig { name: "esp32/id".to_string(), qos: 2 },
                TopicConfig { name: "esp32/walk".to_string(), qos: 2 },
            ],
            store: StoreConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keepalive_secs: 60,
            client_id_prefix: "telemetry-gate".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "iot.db".to_string(),
            write_timeout_ms: 5000,
        }
    }
}

impl GateConfig {
    /// Loads the configuration file, falling back to defaults when absent.
    ///
    /// A file that exists but does not parse is an error rather than a
    /// silent fallback, so a typo cannot demote a configured gateway to
    /// the defaults unnoticed.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        if !path.exists() {
            warn!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = read_to_string(&path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: GateConfig = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        config.validate()?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Rejects values no broker would accept rather than clamping them.
    pub fn validate(&self) -> Result<()> {
        for topic in &self.topics {
            if topic.qos > 2 {
                return Err(eyre!(
                    "invalid qos {} for topic {}: quality-of-service levels are 0-2",
                    topic.qos,
                    topic.name
                ));
            }
        }
        Ok(())
    }

    /// Client identifier for this process start.
    pub fn client_id(&self) -> String {
        format!("{}-{}", self.broker.client_id_prefix, fastrand::u32(0..10_000))
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("telemetry-gate")
        .join("telemetry-gate.toml")
}
