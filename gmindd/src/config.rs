use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tokio::time::Duration;

use crate::GminddResult;
use gmind_model::{FieldId, GreenhouseId};
use gmind_sched::{DispatcherConfig, StaticCatalog};

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct GminddConfig {
    pub database: DatabaseConfig,
    pub mqtt: MqttConfig,
    pub dispatch: DispatchConfig,
    pub fanout: FanoutConfig,
    pub greenhouses: Vec<GreenhouseEntry>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./gmind.db".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub control_client_id: String,
    pub feed_client_id: String,
    /// Topic filter the data service publishes greenhouse state
    /// changes on
    pub feed_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            control_client_id: "gmindd-control".to_string(),
            feed_client_id: "gmindd-feed".to_string(),
            feed_topic: "greenhouse/+/state".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct DispatchConfig {
    pub poll_secs: u64,
    pub staleness_mins: i64,
    pub control_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_secs: 60,
            staleness_mins: 20,
            control_timeout_secs: 10,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct FanoutConfig {
    pub delivery_timeout_millis: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_millis: 2000,
        }
    }
}

/// Greenhouses this deployment validates scheduling targets against
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GreenhouseEntry {
    pub id: GreenhouseId,
    pub fields: FieldId,
}

impl GminddConfig {
    /// Missing file falls back to defaults; a present but malformed
    /// file is an error
    pub fn load(path: &Path) -> GminddResult<Self> {
        if !path.exists() {
            log::info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            poll_period: Duration::from_secs(self.dispatch.poll_secs),
            staleness: TimeDelta::minutes(self.dispatch.staleness_mins),
            control_timeout: Duration::from_secs(self.dispatch.control_timeout_secs),
        }
    }

    pub fn catalog(&self) -> StaticCatalog {
        self.greenhouses
            .iter()
            .map(|g| (g.id.clone(), g.fields))
            .collect()
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.fanout.delivery_timeout_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_service_policy() {
        let config = GminddConfig::default();
        assert_eq!(config.dispatch.poll_secs, 60);
        assert_eq!(config.dispatch.staleness_mins, 20);
        assert_eq!(config.mqtt.port, 1883);
        assert!(config.greenhouses.is_empty());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_the_rest() {
        let raw = r#"
            [dispatch]
            poll_secs = 30

            [[greenhouses]]
            id = "g1"
            fields = 3
        "#;
        let config: GminddConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.dispatch.poll_secs, 30);
        assert_eq!(config.dispatch.staleness_mins, 20);
        assert_eq!(config.database.path, "./gmind.db");
        assert_eq!(config.greenhouses.len(), 1);
        assert_eq!(config.greenhouses[0].fields, 3);
    }
}
