//! Canonicalization helpers shared by validation and repair.

use serde_json::Value;

/// Resolve a reply against the closed option set: exact match first, then
/// trimmed case-insensitive. Returns the canonical option label.
pub(crate) fn resolve_option(reply: &str, options: &[String]) -> Option<String> {
    if let Some(option) = options.iter().find(|option| option.as_str() == reply) {
        return Some(option.clone());
    }

    let trimmed = reply.trim();

    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(trimmed))
        .cloned()
}

/// A number as its canonical JSON value: integral floats collapse to
/// integers so normalization is stable under re-validation.
pub(crate) fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Round to two decimal places, the declared precision for budgets.
pub(crate) fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// A scalar as its answer string: strings are trimmed, numbers and bools
/// take their display form. Arrays and objects are not strings.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
