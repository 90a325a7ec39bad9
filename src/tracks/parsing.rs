use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Reads a number that may arrive either as a JSON number or as a string
/// starting with a numeral ("12", " 4.5 ", "30km/h").
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_leading_float(s),
        _ => None,
    }
}

/// Lossy variant used for required and zero-defaulted fields.
pub fn coerce_or_zero(value: Option<&Value>) -> f64 {
    value.and_then(coerce_f64).unwrap_or(0.0)
}

pub fn parse_leading_float(s: &str) -> Option<f64> {
    let trimmed = s.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    let candidate = &trimmed[..end];

    (1..=candidate.len())
        .rev()
        .find_map(|len| candidate[..len].parse::<f64>().ok())
        .filter(|f| f.is_finite())
}

/// Accepts RFC 3339 strings and epoch milliseconds (as number or string).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| s.parse::<i64>().ok().and_then(from_epoch_millis))
        }
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(from_epoch_millis),
        _ => None,
    }
}

fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Entity ids are strings in practice; numeric ids are tolerated and
/// stringified. Blank strings are not ids.
pub fn parse_entity_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
