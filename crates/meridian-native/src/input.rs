//! Small helpers for reading capability inputs.

use serde_json::{Map, Value};

/// A string field, if present and a string.
pub(crate) fn opt_str<'a>(input: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

/// A boolean field, if present and a boolean.
pub(crate) fn opt_bool(input: &Map<String, Value>, key: &str) -> Option<bool> {
    input.get(key).and_then(Value::as_bool)
}

/// A non-negative integer field, if present and numeric.
pub(crate) fn opt_u64(input: &Map<String, Value>, key: &str) -> Option<u64> {
    match input.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        _ => None,
    }
}

/// A numeric field clamped into `[min, max]`, `default` when absent.
pub(crate) fn clamped_u64(
    input: &Map<String, Value>,
    key: &str,
    min: u64,
    max: u64,
    default: u64,
) -> u64 {
    opt_u64(input, key).unwrap_or(default).clamp(min, max)
}
