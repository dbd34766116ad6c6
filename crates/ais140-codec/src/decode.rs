use crate::error::{DecodeError, Result};
use crate::types::{labels, PacketType, TelemetryRecord};
use time::{Date, Month, PrimitiveDateTime, Time};
use tracing::debug;

/// Every recognized line starts with this marker.
pub const PROTOCOL_PREFIX: &str = "GTPL";
pub const SUB_MESSAGE_DELIMITER: char = '#';
pub const FIELD_DELIMITER: char = ',';

/// Field count of the alert-only packets (`$2`..`$9`).
pub const ALERT_FIELD_COUNT: usize = 10;
/// Field count of the status packet (`$1`).
pub const STATUS_FIELD_COUNT: usize = 18;

/// Timestamp given to records whose date/time pair does not parse.
///
/// This is the Unix epoch, not the zero `time.Time` of Go-based gateways
/// (`-62135596800000`, 0001-01-01T00:00:00Z), which earlier bridges published here.
pub const DEGRADED_TIMESTAMP_MILLIS: i64 = 0;

// Common field indices
const IDX_DEVICE_ID: usize = 1;
const IDX_DATE: usize = 3;
const IDX_TIME: usize = 4;
const IDX_LAT: usize = 5;
const IDX_LAT_HEMI: usize = 6;
const IDX_LNG: usize = 7;
const IDX_LNG_HEMI: usize = 8;

// Packet-specific field indices
const IDX_PAYLOAD: usize = 9;
const IDX_STATUS_BOX: usize = 13;
const IDX_STATUS_BATTERY: usize = 15;
const IDX_STATUS_IGNITION: usize = 16;

/// Decode a raw line into every record it carries.
///
/// Never fails: unsupported lines and malformed sub-messages are dropped and logged at debug
/// level.
pub fn decode(raw: &str) -> Vec<TelemetryRecord> {
    records(raw).collect()
}

/// Lazy form of [`decode`]; each record is yielded as soon as its sub-message is decoded.
pub fn records(raw: &str) -> impl Iterator<Item = TelemetryRecord> + '_ {
    let accepted = match check_protocol(raw) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, len = raw.len(), "dropping line");
            false
        }
    };
    accepted
        .then(|| raw.split(SUB_MESSAGE_DELIMITER))
        .into_iter()
        .flatten()
        .filter_map(|message| match decode_message(message) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, message, "dropping sub-message");
                None
            }
        })
}

fn check_protocol(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    if !raw.starts_with(PROTOCOL_PREFIX) {
        return Err(DecodeError::UnsupportedProtocol);
    }
    Ok(())
}

/// Decode one `#`-delimited sub-message.
pub fn decode_message(message: &str) -> Result<TelemetryRecord> {
    let fields: Vec<&str> = message.split(FIELD_DELIMITER).collect();
    match fields.len() {
        1 => return Err(DecodeError::NotCsv(message.to_string())),
        ALERT_FIELD_COUNT | STATUS_FIELD_COUNT => {}
        n => return Err(DecodeError::FieldCount(n)),
    }

    // Field 0 is "GTPL $N"
    let marker = field(&fields, 0, "marker")?;
    let tag = marker
        .split(' ')
        .nth(1)
        .ok_or_else(|| DecodeError::MissingPacketTag(marker.to_string()))?;

    let device_id = field(&fields, IDX_DEVICE_ID, "device_id")?;
    let date = field(&fields, IDX_DATE, "date")?;
    let clock = field(&fields, IDX_TIME, "time")?;
    let timestamp_millis = match parse_timestamp(date, clock) {
        Ok(ts) => ts,
        Err(e) => {
            debug!(error = %e, device_id, "keeping record with degraded timestamp");
            DEGRADED_TIMESTAMP_MILLIS
        }
    };

    let mut latitude = parse_float(field(&fields, IDX_LAT, "latitude")?, "latitude")?;
    if field(&fields, IDX_LAT_HEMI, "latitude_hemisphere")? == "S" {
        latitude = -latitude;
    }
    let mut longitude = parse_float(field(&fields, IDX_LNG, "longitude")?, "longitude")?;
    if field(&fields, IDX_LNG_HEMI, "longitude_hemisphere")? == "W" {
        longitude = -longitude;
    }

    let mut record = TelemetryRecord::new(
        PacketType::from_tag(tag),
        device_id,
        timestamp_millis,
        latitude,
        longitude,
    );

    match record.packet_type {
        PacketType::Status => {
            record.speed = Some(parse_int(field(&fields, IDX_PAYLOAD, "speed")?, "speed")?);
            record.box_open = Some(parse_bool(
                field(&fields, IDX_STATUS_BOX, "box_open")?,
                "box_open",
            )?);
            record.battery_connected = Some(parse_bool(
                field(&fields, IDX_STATUS_BATTERY, "battery_connected")?,
                "battery_connected",
            )?);
            record.ignition_on = Some(parse_bool(
                field(&fields, IDX_STATUS_IGNITION, "ignition_on")?,
                "ignition_on",
            )?);
        }
        PacketType::IgnitionAlert => {
            let on = parse_bool(field(&fields, IDX_PAYLOAD, "ignition")?, "ignition")?;
            record.alert = Some(labels::ignition(on).to_string());
        }
        PacketType::BatteryAlert => {
            let connected = parse_bool(field(&fields, IDX_PAYLOAD, "battery")?, "battery")?;
            record.alert = Some(labels::battery(connected).to_string());
        }
        PacketType::LowBatteryAlert => record.alert = Some(labels::BATTERY_LOW.to_string()),
        PacketType::HarshAcceleration => {
            record.alert = Some(labels::HARSH_ACCELERATION.to_string())
        }
        PacketType::HarshBraking => record.alert = Some(labels::HARSH_BRAKING.to_string()),
        PacketType::OverSpeed => {
            record.speed = Some(parse_int(field(&fields, IDX_PAYLOAD, "speed")?, "speed")?);
            record.alert = Some(labels::OVER_SPEEDING.to_string());
        }
        PacketType::BoxAlert => {
            let open = parse_bool(field(&fields, IDX_PAYLOAD, "box")?, "box")?;
            record.alert = Some(labels::box_state(open).to_string());
        }
        PacketType::Sos => record.alert = Some(labels::SOS.to_string()),
        PacketType::Unknown(_) => {}
    }

    Ok(record)
}

fn field<'a>(fields: &[&'a str], index: usize, name: &'static str) -> Result<&'a str> {
    fields
        .get(index)
        .copied()
        .ok_or(DecodeError::MissingField { index, name })
}

/// Out-of-range (`1e400`) and non-numeric (`NaN`, `inf`) values are rejected; the envelope
/// has no JSON rendering for them.
fn parse_float(value: &str, name: &'static str) -> Result<f64> {
    let invalid = || DecodeError::InvalidFloat {
        name,
        value: value.to_string(),
    };
    let parsed = value.parse::<f64>().map_err(|_| invalid())?;
    if !parsed.is_finite() {
        return Err(invalid());
    }
    Ok(parsed)
}

fn parse_int(value: &str, name: &'static str) -> Result<i64> {
    value.parse::<i64>().map_err(|_| DecodeError::InvalidInt {
        name,
        value: value.to_string(),
    })
}

/// Trackers emit `0`/`1`, but the word forms are accepted as well.
fn parse_bool(value: &str, name: &'static str) -> Result<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(DecodeError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}

/// `DDMMYY` + `HHMMSS`, UTC, to epoch milliseconds.
fn parse_timestamp(date: &str, clock: &str) -> Result<i64> {
    let invalid = || DecodeError::InvalidTimestamp(format!("{date}:{clock}"));
    let [day, month, yy] = two_digit_groups(date).ok_or_else(invalid)?;
    let [hour, minute, second] = two_digit_groups(clock).ok_or_else(invalid)?;

    // Two-digit years: 69..=99 is the 1900s, 00..=68 the 2000s.
    let year = if yy >= 69 {
        1900 + i32::from(yy)
    } else {
        2000 + i32::from(yy)
    };
    let month = Month::try_from(month).map_err(|_| invalid())?;
    let date = Date::from_calendar_date(year, month, day).map_err(|_| invalid())?;
    let time = Time::from_hms(hour, minute, second).map_err(|_| invalid())?;

    Ok(PrimitiveDateTime::new(date, time)
        .assume_utc()
        .unix_timestamp()
        * 1000)
}

fn two_digit_groups(s: &str) -> Option<[u8; 3]> {
    let b = s.as_bytes();
    if b.len() != 6 || !b.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let pair = |i: usize| (b[i] - b'0') * 10 + (b[i + 1] - b'0');
    Some([pair(0), pair(2), pair(4)])
}
