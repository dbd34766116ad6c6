//! broker-transport: publish-side abstraction over the telemetry broker
//!
//! This crate provides the [`Publisher`] trait the bridge dispatches through, with
//! feature-gated backends. The default build enables a `mock` backend so that binaries and
//! tests run on any host without a broker; the `mqtt` feature adds an rumqttc client.

mod types;
pub use types::{BrokerAddr, PublishedMessage, Topics, DEFAULT_MQTT_PORT};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::Publisher;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MockPublisher;

#[cfg(feature = "mqtt")]
mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttPublisher, MqttSettings};
