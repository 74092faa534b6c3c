//! Lenient readers for stored documents.
//!
//! Documents are written by several clients over time, so numeric fields sometimes arrive
//! as strings, timestamps arrive either as RFC 3339 text or as `{seconds, nanoseconds}`
//! objects, and map keys may not parse. Everything here defaults instead of failing.

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Reads a JSON value as a finite number, falling back to `0.0`.
pub fn value_to_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&value))
}

pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            warn!("Expected a string, found {}", other);
            String::new()
        }
    })
}

pub fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_string(deserializer)?;
    Ok(if value.is_empty() { None } else { Some(value) })
}

/// Parses a timestamp in any of the shapes the store produces.
pub fn value_to_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos as u32).single()
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

pub fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    let parsed = value_to_timestamp(&value);
    if parsed.is_none() {
        warn!("Ignoring unreadable timestamp {}", value);
    }
    Ok(parsed)
}

/// Reads a JSON object whose keys must parse as `K`, dropping the entries that don't.
///
/// `what` names the map in the log line.
pub fn keyed_entries<'de, D, K>(deserializer: D, what: &str) -> Result<Vec<(K, Value)>, D::Error>
where
    D: Deserializer<'de>,
    K: FromStr,
{
    let value = Value::deserialize(deserializer)?;
    let map = match value {
        Value::Object(map) => map,
        Value::Null => return Ok(Vec::new()),
        other => {
            warn!("Expected an object for {}, found {}", what, other);
            return Ok(Vec::new());
        }
    };
    let mut entries = Vec::with_capacity(map.len());
    for (key, value) in map {
        match key.parse::<K>() {
            Ok(parsed) => entries.push((parsed, value)),
            Err(_) => warn!("Dropping unrecognised {} key {:?}", what, key),
        }
    }
    Ok(entries)
}
