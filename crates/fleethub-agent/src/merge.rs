//! Structural comparison of desired and live specs

use serde::Serialize;
use serde_json::Value;

/// True if `existing` already satisfies `desired`
///
/// Fields that are null or absent in `desired` are ignored. Everything else
/// must match: objects key by key, arrays element by element with equal
/// length, scalars by value.
pub fn is_derivative(desired: &Value, existing: &Value) -> bool {
    match (desired, existing) {
        (Value::Null, _) => true,
        (Value::Object(d), Value::Object(e)) => d
            .iter()
            .all(|(k, dv)| dv.is_null() || e.get(k).is_some_and(|ev| is_derivative(dv, ev))),
        (Value::Array(d), Value::Array(e)) => {
            d.len() == e.len() && d.iter().zip(e).all(|(dv, ev)| is_derivative(dv, ev))
        }
        (d, e) => d == e,
    }
}

/// [`is_derivative`] over any two serializable specs
///
/// A spec that fails to serialize is never considered satisfied.
pub fn spec_is_derivative<T: Serialize>(desired: &T, existing: &T) -> bool {
    match (serde_json::to_value(desired), serde_json::to_value(existing)) {
        (Ok(d), Ok(e)) => is_derivative(&d, &e),
        _ => false,
    }
}
