//! Best-effort coercion of loosely typed payload fields.
//!
//! Producers are not trusted to send exact types: ticks arrive as strings,
//! counters as floats, lists as `null`. Every accessor here returns a value
//! of the canonical shape and never fails; a field that cannot be read
//! yields the caller's fallback.

use serde::Serialize;
use serde_json::{Map, Value};

/// Literal stored when a structured field cannot be serialized.
pub const JSON_FALLBACK: &str = "null";

/// Convert a JSON value to an integer, or return `fallback`.
///
/// Accepted inputs:
/// - integers (unsigned values above `i64::MAX` saturate)
/// - finite floats, truncated toward zero
/// - strings holding an integer or a finite float, after trimming
/// - booleans (`1` / `0`)
///
/// `null`, objects, arrays, `NaN`, and infinities yield `fallback`.
pub fn best_effort_int(value: Option<&Value>, fallback: i64) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().and_then(truncate_finite))
            .unwrap_or(fallback),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate_finite))
                .unwrap_or(fallback)
        }
        Some(Value::Bool(b)) => i64::from(*b),
        _ => fallback,
    }
}

/// Truncate a float toward zero, saturating at the `i64` bounds.
#[allow(clippy::cast_possible_truncation)]
fn truncate_finite(f: f64) -> Option<i64> {
    // `as` saturates for out-of-range floats.
    f.is_finite().then(|| f.trunc() as i64)
}

/// Serialize a structured value to its stored string form.
///
/// Never fails: a serialization error yields [`JSON_FALLBACK`].
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to serialize structured field, storing null");
        JSON_FALLBACK.to_owned()
    })
}

/// Read-only view over a payload object with coercing accessors.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    /// Wrap a JSON value. Non-objects behave like an empty object.
    pub fn new(value: &'a Value) -> Self {
        Self {
            map: value.as_object(),
        }
    }

    /// Wrap an object map directly.
    pub const fn from_map(map: &'a Map<String, Value>) -> Self {
        Self { map: Some(map) }
    }

    /// Raw access to a field.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(key))
    }

    /// Integer field with a zero fallback.
    pub fn int(&self, key: &str) -> i64 {
        best_effort_int(self.get(key), 0)
    }

    /// Integer field with an explicit fallback.
    pub fn int_or(&self, key: &str, fallback: i64) -> i64 {
        best_effort_int(self.get(key), fallback)
    }

    /// String field; numbers and booleans are rendered, anything else is
    /// the empty string.
    pub fn string(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    /// String field mapped to `None` when empty.
    pub fn non_empty_string(&self, key: &str) -> Option<String> {
        Some(self.string(key)).filter(|s| !s.is_empty())
    }

    /// List field; anything that is not an array is empty.
    pub fn list(&self, key: &str) -> &'a [Value] {
        self.get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Object field; anything that is not an object is an empty map.
    pub fn object(&self, key: &str) -> Map<String, Value> {
        self.get(key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Integer 3-tuple such as a block position. Missing components are 0.
    pub fn triple(&self, key: &str) -> [i64; 3] {
        let items = self.list(key);
        [
            best_effort_int(items.first(), 0),
            best_effort_int(items.get(1), 0),
            best_effort_int(items.get(2), 0),
        ]
    }
}
