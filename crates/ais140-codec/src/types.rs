use core::fmt;
use serde::{Serialize, Serializer};

/// Protocol tag stamped on every record decoded from a `GTPL` line.
pub const PROTOCOL_TAG: &str = "AIS140";

/// Packet layout selected by the `$N` token in field 0.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PacketType {
    /// `$1`: periodic status report (18-field form)
    Status,
    /// `$2`
    IgnitionAlert,
    /// `$3`: main battery connected/disconnected
    BatteryAlert,
    /// `$4`
    LowBatteryAlert,
    /// `$5`
    HarshAcceleration,
    /// `$6`
    HarshBraking,
    /// `$7`
    OverSpeed,
    /// `$8`: box opened/closed
    BoxAlert,
    /// `$9`
    Sos,
    /// Any other tag; decoded with the common fields only.
    Unknown(String),
}

impl PacketType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "$1" => PacketType::Status,
            "$2" => PacketType::IgnitionAlert,
            "$3" => PacketType::BatteryAlert,
            "$4" => PacketType::LowBatteryAlert,
            "$5" => PacketType::HarshAcceleration,
            "$6" => PacketType::HarshBraking,
            "$7" => PacketType::OverSpeed,
            "$8" => PacketType::BoxAlert,
            "$9" => PacketType::Sos,
            other => PacketType::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            PacketType::Status => "$1",
            PacketType::IgnitionAlert => "$2",
            PacketType::BatteryAlert => "$3",
            PacketType::LowBatteryAlert => "$4",
            PacketType::HarshAcceleration => "$5",
            PacketType::HarshBraking => "$6",
            PacketType::OverSpeed => "$7",
            PacketType::BoxAlert => "$8",
            PacketType::Sos => "$9",
            PacketType::Unknown(tag) => tag,
        }
    }

    pub fn is_alert(&self) -> bool {
        !matches!(self, PacketType::Status | PacketType::Unknown(_))
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for PacketType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

/// Alert label lookup for packets whose label depends on a boolean payload.
pub(crate) mod labels {
    pub const IGNITION_ON: &str = "Ignition on";
    pub const IGNITION_OFF: &str = "Ignition off";
    pub const BATTERY_CONNECTED: &str = "Battery connected";
    pub const BATTERY_DISCONNECTED: &str = "Battery disconnected";
    pub const BATTERY_LOW: &str = "Battery low";
    pub const HARSH_ACCELERATION: &str = "Harsh Acceleration";
    pub const HARSH_BRAKING: &str = "Harsh Braking";
    pub const OVER_SPEEDING: &str = "OverSpeeding Alert";
    pub const BOX_OPENED: &str = "Box Opened";
    pub const BOX_CLOSED: &str = "Box Closed";
    pub const SOS: &str = "SOS";

    pub fn ignition(on: bool) -> &'static str {
        if on {
            IGNITION_ON
        } else {
            IGNITION_OFF
        }
    }

    pub fn battery(connected: bool) -> &'static str {
        if connected {
            BATTERY_CONNECTED
        } else {
            BATTERY_DISCONNECTED
        }
    }

    pub fn box_state(open: bool) -> &'static str {
        if open {
            BOX_OPENED
        } else {
            BOX_CLOSED
        }
    }
}

/// One decoded `#`-delimited sub-message.
///
/// Optional fields are only populated for the packet types that carry them; the encoder
/// renders exactly the populated ones.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub protocol: &'static str,
    pub packet_type: PacketType,
    pub device_id: String,
    pub timestamp_millis: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignition_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
}

impl TelemetryRecord {
    /// A record holding only the fields common to every packet type.
    pub fn new(
        packet_type: PacketType,
        device_id: impl Into<String>,
        timestamp_millis: i64,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            protocol: PROTOCOL_TAG,
            packet_type,
            device_id: device_id.into(),
            timestamp_millis,
            latitude,
            longitude,
            speed: None,
            box_open: None,
            battery_connected: None,
            ignition_on: None,
            alert: None,
        }
    }
}
