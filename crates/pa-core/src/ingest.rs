//! Event record decoding.
//!
//! Input lines are single JSON objects tagged by `event_type`:
//!
//! ```text
//! {"event_type":"befriend", "timestamp":"2017-01-01 13:00:00", "id1":"1", "id2":"2"}
//! {"event_type":"purchase", "timestamp":"2017-01-01 13:00:05", "id":"1", "amount":"59.33"}
//! ```
//!
//! Amounts arrive as strings in the source data but numbers are accepted
//! too. Every decode failure is line-local: the caller logs and skips.

use chrono::NaiveDateTime;
use pa_common::{Error, Result, UserId};
use serde_json::Value;

/// Timestamp format used throughout the event stream.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One decoded event, in nominal stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Befriend {
        timestamp: NaiveDateTime,
        id1: UserId,
        id2: UserId,
    },
    Unfriend {
        timestamp: NaiveDateTime,
        id1: UserId,
        id2: UserId,
    },
    Purchase {
        timestamp: NaiveDateTime,
        id: UserId,
        amount: f64,
    },
}

impl EventRecord {
    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            EventRecord::Befriend { timestamp, .. }
            | EventRecord::Unfriend { timestamp, .. }
            | EventRecord::Purchase { timestamp, .. } => *timestamp,
        }
    }
}

/// Parameter header carried as the first line of a batch file:
/// `{"D":"3", "T":"50"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    /// Window size.
    pub window_size: usize,
    /// Network depth.
    pub network_depth: u32,
}

/// Decode one event line.
pub fn decode_line(line: &str) -> Result<EventRecord> {
    let value: Value = serde_json::from_str(line)?;
    let event_type = value
        .get("event_type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::UnknownEvent("<missing event_type>".to_string()))?;

    let timestamp = parse_timestamp(&value)?;
    match event_type {
        "befriend" => Ok(EventRecord::Befriend {
            timestamp,
            id1: user_field(&value, "id1")?,
            id2: user_field(&value, "id2")?,
        }),
        "unfriend" => Ok(EventRecord::Unfriend {
            timestamp,
            id1: user_field(&value, "id1")?,
            id2: user_field(&value, "id2")?,
        }),
        "purchase" => Ok(EventRecord::Purchase {
            timestamp,
            id: user_field(&value, "id")?,
            amount: amount_field(&value)?,
        }),
        other => Err(Error::UnknownEvent(other.to_string())),
    }
}

/// Decode the batch parameter header line.
pub fn decode_header(line: &str) -> Result<BatchHeader> {
    let value: Value = serde_json::from_str(line)?;
    let window_size = int_field(&value, "T")? as usize;
    let network_depth = int_field(&value, "D")? as u32;
    Ok(BatchHeader {
        window_size,
        network_depth,
    })
}

/// Cheap timestamp extraction that avoids a full JSON decode.
///
/// Scans for the `"timestamp":"..."` fragment and parses only it; lines
/// already strictly behind the checkpoint marker can be discarded
/// without decoding. `None` means the hint is unavailable and the line
/// must take the slow path.
pub fn timestamp_hint(line: &str) -> Option<NaiveDateTime> {
    let key = "\"timestamp\":\"";
    let at = line.find(key)? + key.len();
    let rest = &line[at..];
    let end = rest.find('"')?;
    NaiveDateTime::parse_from_str(&rest[..end], TIMESTAMP_FORMAT).ok()
}

fn parse_timestamp(value: &Value) -> Result<NaiveDateTime> {
    let raw = value
        .get("timestamp")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MalformedTimestamp("<missing>".to_string()))?;
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|_| Error::MalformedTimestamp(raw.to_string()))
}

fn user_field(value: &Value, key: &str) -> Result<UserId> {
    let uid = match value.get(key) {
        Some(Value::String(s)) => UserId::from(s.as_str()),
        // Tolerate numeric ids; normalize to their decimal form.
        Some(Value::Number(n)) => UserId::from(n.to_string()),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "missing or non-scalar \"{key}\" field"
            )))
        }
    };
    if !uid.is_valid() {
        return Err(Error::InvalidArgument(format!("blank \"{key}\" field")));
    }
    Ok(uid)
}

fn amount_field(value: &Value) -> Result<f64> {
    let amount = match value.get("amount") {
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::MalformedAmount(s.clone()))?,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::MalformedAmount(n.to_string()))?,
        other => return Err(Error::MalformedAmount(format!("{other:?}"))),
    };
    // "NaN" and "inf" parse as floats but would contaminate the running
    // sum and sum-of-squares for the remaining life of the window.
    if !amount.is_finite() {
        return Err(Error::MalformedAmount(amount.to_string()));
    }
    Ok(amount)
}

fn int_field(value: &Value, key: &str) -> Result<u64> {
    match value.get(key) {
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::InvalidConfig(format!("non-integer \"{key}\": {s}"))),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| Error::InvalidConfig(format!("non-integer \"{key}\": {n}"))),
        _ => Err(Error::InvalidConfig(format!("missing \"{key}\" field"))),
    }
}
