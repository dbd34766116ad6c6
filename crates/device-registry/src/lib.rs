//! device-registry: which devices have announced themselves to the broker
//!
//! The bridge sends a one-time connect message per device per process lifetime. This crate
//! holds that state behind a reader/writer lock so concurrent line tasks can share it.

mod registry;
pub use registry::DeviceRegistry;
