use crate::{BridgeError, Result};
use broker_transport::{BrokerAddr, Topics};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Largest `listen.max_in_flight` a task semaphore can hold and drain in one acquire.
pub const MAX_IN_FLIGHT_LIMIT: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS
} else {
    u32::MAX as usize
};

/// Bridge configuration, loaded from YAML. Every field has a default, so an empty file or a
/// partial one is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub listen: ListenConfig,
    pub mqtt: MqttConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
    /// Longer lines are discarded up to the next newline.
    pub max_line_bytes: usize,
    /// Upper bound on line tasks running at once.
    pub max_in_flight: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_line_bytes: 4096,
            max_in_flight: 1024,
        }
    }
}

impl ListenConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_url: String,
    pub access_token: Option<String>,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub topics: Topics,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: "tcp://127.0.0.1:1883".to_string(),
            access_token: None,
            client_id: "tbBridge".to_string(),
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            topics: Topics::default(),
        }
    }
}

impl MqttConfig {
    pub fn broker(&self) -> Result<BrokerAddr> {
        Ok(BrokerAddr::parse(&self.broker_url)?)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Debug-level diagnostics, including why lines were dropped.
    pub verbose: bool,
    /// Also write logs to this file.
    pub file: Option<PathBuf>,
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| BridgeError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&raw)?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        // serde_yaml maps an empty document to unit, not to an empty map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen.host.trim().is_empty() {
            return Err(invalid("listen.host must not be empty"));
        }
        if self.listen.max_line_bytes == 0 {
            return Err(invalid("listen.max_line_bytes must be positive"));
        }
        if self.listen.max_in_flight == 0 {
            return Err(invalid("listen.max_in_flight must be positive"));
        }
        if self.listen.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            return Err(BridgeError::InvalidConfig(format!(
                "listen.max_in_flight must not exceed {MAX_IN_FLIGHT_LIMIT}"
            )));
        }
        self.mqtt.broker()?;
        if self.mqtt.client_id.trim().is_empty() {
            return Err(invalid("mqtt.client_id must not be empty"));
        }
        if self.mqtt.connect_timeout_secs == 0 {
            return Err(invalid("mqtt.connect_timeout_secs must be positive"));
        }
        if self.mqtt.topics.connect.is_empty() || self.mqtt.topics.telemetry.is_empty() {
            return Err(invalid("mqtt.topics entries must not be empty"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> BridgeError {
    BridgeError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen.addr(), "0.0.0.0:8000");
        assert_eq!(config.mqtt.client_id, "tbBridge");
        assert_eq!(config.mqtt.topics.telemetry, "v1/gateway/telemetry");
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(BridgeConfig::from_yaml_str("").unwrap(), BridgeConfig::default());
        assert_eq!(BridgeConfig::from_yaml_str("  \n").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let raw = "
listen:
  port: 9100
mqtt:
  broker_url: tcp://demo.thingsboard.io:1883
  access_token: secret
  topics:
    telemetry: custom/telemetry
logging:
  verbose: true
";
        let config = BridgeConfig::from_yaml_str(raw).unwrap();
        assert_eq!(config.listen.port, 9100);
        assert_eq!(config.listen.host, "0.0.0.0");
        assert_eq!(config.listen.max_line_bytes, 4096);
        assert_eq!(config.mqtt.access_token.as_deref(), Some("secret"));
        assert_eq!(config.mqtt.topics.connect, "v1/gateway/connect");
        assert_eq!(config.mqtt.topics.telemetry, "custom/telemetry");
        assert!(config.logging.verbose);
        assert_eq!(config.mqtt.broker().unwrap().host(), "demo.thingsboard.io");
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = BridgeConfig::default();
        config.mqtt.access_token = Some("token".into());
        config.logging.file = Some(PathBuf::from("/var/log/gtpl-bridge.log"));
        let raw = serde_yaml::to_string(&config).unwrap();
        assert_eq!(BridgeConfig::from_yaml_str(&raw).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = BridgeConfig::default();
        config.listen.max_in_flight = 0;
        assert!(matches!(config.validate(), Err(BridgeError::InvalidConfig(_))));

        let mut config = BridgeConfig::default();
        config.mqtt.broker_url = "tcp://broker:port".into();
        assert!(matches!(config.validate(), Err(BridgeError::Transport(_))));

        let mut config = BridgeConfig::default();
        config.mqtt.topics.connect.clear();
        assert!(config.validate().is_err());

        assert!(matches!(
            BridgeConfig::from_yaml_str("listen: [1, 2]"),
            Err(BridgeError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_max_in_flight_upper_bound() {
        let mut config = BridgeConfig::default();
        config.listen.max_in_flight = MAX_IN_FLIGHT_LIMIT;
        assert!(config.validate().is_ok());

        config.listen.max_in_flight = MAX_IN_FLIGHT_LIMIT + 1;
        assert!(matches!(config.validate(), Err(BridgeError::InvalidConfig(_))));

        config.listen.max_in_flight = usize::MAX;
        assert!(matches!(config.validate(), Err(BridgeError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = BridgeConfig::load("/nonexistent/gtpl-bridge.yaml").unwrap_err();
        assert!(matches!(err, BridgeError::ConfigIo { .. }));
    }
}
