//! Custom deserializers for forgiving payload parsing in ride-along.
//!
//! The backend is loose about field types: counts arrive as strings, dates as
//! either RFC 3339 text or epoch milliseconds, and optional sub-objects are
//! sometimes malformed. These deserializers let a payload degrade field by
//! field instead of failing as a whole.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::models::{RequestStatus, RideStatus};

/// Deserializes an optional timestamp.
///
/// # Accepted Formats
///
/// * **RFC 3339**: `"2025-03-01T08:30:00Z"`, `"2025-03-01T08:30:00+02:00"`
/// * **Naive ISO**: `"2025-03-01T08:30:00.000"` (interpreted as UTC)
/// * **Epoch milliseconds**: `1740817800000`
///
/// Anything else, including empty strings, becomes `None`.
pub fn de_option_datetime_forgiving<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(v) = opt else { return Ok(None) };
    Ok(parse_datetime_value(&v))
}

pub fn parse_datetime_value(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            match NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                Ok(naive) => Some(naive.and_utc()),
                Err(e) => {
                    tracing::debug!(value = s, error = %e, "unparseable timestamp ignored");
                    None
                }
            }
        }
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Deserializes Option<u32> accepting integers, floats (rounded), and numeric strings.
/// Negative values clamp to 0; garbage becomes `None`.
pub fn de_option_u32_forgiving<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(v) = opt else { return Ok(None) };
    let val = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(val
        .filter(|f| f.is_finite())
        .map(|f| f.round().clamp(0.0, u32::MAX as f64) as u32))
}

/// Deserializes Option<f64> accepting numbers and numeric strings (`"12.50"`).
pub fn de_option_f64_forgiving<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(v) = opt else { return Ok(None) };
    let val = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_start_matches('$').parse::<f64>().ok(),
        _ => None,
    };
    Ok(val.filter(|f| f.is_finite()))
}

/// Deserializes a request status leniently; see [`RequestStatus::parse`].
pub fn de_option_request_status<'de, D>(
    deserializer: D,
) -> Result<Option<RequestStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(opt
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(RequestStatus::parse))
}

pub fn de_option_ride_status<'de, D>(deserializer: D) -> Result<Option<RideStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(opt
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(RideStatus::parse))
}

/// Deserializes an optional sub-object, turning a malformed value into `None`.
pub fn de_option_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(v) = opt else { return Ok(None) };
    if v.is_null() {
        return Ok(None);
    }
    match serde_json::from_value::<T>(v) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            tracing::debug!(error = %e, "malformed optional field ignored");
            Ok(None)
        }
    }
}

/// Deserializes a list, tolerating `null` and dropping malformed elements.
pub fn de_vec_lenient<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    match opt {
        Some(serde_json::Value::Array(arr)) => Ok(parse_lenient_list(arr)),
        _ => Ok(Vec::new()),
    }
}

pub fn parse_lenient_list<T: DeserializeOwned>(arr: Vec<serde_json::Value>) -> Vec<T> {
    let mut out = Vec::with_capacity(arr.len());
    for el in arr {
        match serde_json::from_value::<T>(el) {
            Ok(parsed) => out.push(parsed),
            Err(e) => tracing::debug!(error = %e, "malformed list element dropped"),
        }
    }
    out
}
