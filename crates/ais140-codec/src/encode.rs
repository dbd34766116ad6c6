use crate::types::TelemetryRecord;
use core::fmt::{self, Write};

/// Gateway-API telemetry payload for one record, keyed by device id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryEnvelope {
    device_id: String,
    payload: String,
}

impl TelemetryEnvelope {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The rendered JSON document.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

impl fmt::Display for TelemetryEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload)
    }
}

/// Render a record as
/// `{"<id>":[{"ts":<ms>,"values":{"lat":..,"lng":..[,"speed"][,"box"][,"bat"][,"ign"][,"alert"]}}]}`.
///
/// Coordinates are fixed-point with six fractional digits; only populated optional fields
/// are emitted, always in the order above.
pub fn encode(record: &TelemetryRecord) -> TelemetryEnvelope {
    let mut out = String::with_capacity(128);
    out.push('{');
    push_json_str(&mut out, &record.device_id);
    let _ = write!(
        out,
        r#":[{{"ts":{},"values":{{"lat":{:.6},"lng":{:.6}"#,
        record.timestamp_millis, record.latitude, record.longitude
    );
    if let Some(speed) = record.speed {
        let _ = write!(out, r#","speed":{speed}"#);
    }
    if let Some(open) = record.box_open {
        let _ = write!(out, r#","box":{open}"#);
    }
    if let Some(connected) = record.battery_connected {
        let _ = write!(out, r#","bat":{connected}"#);
    }
    if let Some(on) = record.ignition_on {
        let _ = write!(out, r#","ign":{on}"#);
    }
    if let Some(alert) = &record.alert {
        out.push_str(r#","alert":"#);
        push_json_str(&mut out, alert);
    }
    out.push_str("}}]}");

    TelemetryEnvelope {
        device_id: record.device_id.clone(),
        payload: out,
    }
}

/// `{"device": "<id>"}`, sent once per device before its first telemetry.
pub fn encode_announcement(device_id: &str) -> String {
    let mut out = String::with_capacity(device_id.len() + 16);
    out.push_str(r#"{"device": "#);
    push_json_str(&mut out, device_id);
    out.push('}');
    out
}

fn push_json_str(out: &mut String, s: &str) {
    out.push_str(&serde_json::Value::from(s).to_string());
}
