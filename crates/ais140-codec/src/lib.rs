//! ais140-codec: GTPL/AIS140 tracker wire format
//!
//! Decodes the comma-delimited, `#`-framed lines emitted by legacy vehicle trackers into
//! [`TelemetryRecord`]s and renders them as ThingsBoard gateway-API JSON envelopes. Both
//! directions are pure functions; malformed input is dropped, never surfaced.

mod types;
pub use types::{PacketType, TelemetryRecord, PROTOCOL_TAG};

mod error;
pub use error::{DecodeError, Result};

mod decode;
pub use decode::{
    decode, decode_message, records, ALERT_FIELD_COUNT, DEGRADED_TIMESTAMP_MILLIS,
    PROTOCOL_PREFIX, STATUS_FIELD_COUNT,
};

mod encode;
pub use encode::{encode, encode_announcement, TelemetryEnvelope};
