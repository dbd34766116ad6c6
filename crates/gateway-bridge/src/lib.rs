//! gateway-bridge: TCP-to-broker bridge for GTPL/AIS140 trackers
//!
//! Trackers connect over TCP and write newline-terminated lines. Each line is decoded,
//! encoded into a gateway envelope and published on its own task. A device is announced on
//! the connect topic before its first telemetry.
//!
//! ```text
//! LineListener -> LineHandler -> LinePipeline -> Dispatcher -> Publisher
//!                                                    |
//!                                              DeviceRegistry
//! ```

mod error;
pub use error::{BridgeError, Result};

mod config;
pub use config::{BridgeConfig, ListenConfig, LoggingConfig, MqttConfig, MAX_IN_FLIGHT_LIMIT};

mod metrics;
pub use metrics::BridgeMetrics;

mod dispatcher;
pub use dispatcher::{DispatchReport, Dispatcher};

mod pipeline;
pub use pipeline::{LineOutcome, LinePipeline};

mod listener;
pub use listener::{ConnectionStats, LineHandler, LineListener};

mod bridge;
pub use bridge::Bridge;
