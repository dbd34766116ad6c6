use crate::{Result, TransportError};
use core::fmt;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Topics of the gateway API the bridge publishes on.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
    /// Device announcements (`{"device": "<id>"}`)
    pub connect: String,
    /// Telemetry envelopes
    pub telemetry: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            connect: "v1/gateway/connect".to_string(),
            telemetry: "v1/gateway/telemetry".to_string(),
        }
    }
}

/// Broker host and port, parsed from `tcp://host:port`, `mqtt://host:port` or `host:port`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BrokerAddr {
    host: String,
    port: u16,
}

impl BrokerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        let rest = trimmed
            .strip_prefix("tcp://")
            .or_else(|| trimmed.strip_prefix("mqtt://"))
            .unwrap_or(trimmed);
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| TransportError::InvalidBrokerUrl(url.to_string()))?;
                (host, port)
            }
            None => (rest, DEFAULT_MQTT_PORT),
        };
        if host.is_empty() || host.contains('/') {
            return Err(TransportError::InvalidBrokerUrl(url.to_string()));
        }
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

/// A message handed to a [`crate::Publisher`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> &str {
        core::str::from_utf8(&self.payload).unwrap_or("")
    }
}
