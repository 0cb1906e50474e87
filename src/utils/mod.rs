use std::sync::{Mutex, MutexGuard};

use rand::{distributions::Alphanumeric, Rng};
use serde_json::Value;

use crate::error::{Error, Result};

pub fn generate_random_ascii_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Acquires the given [`Mutex`].
/// Failing to acquire it is considered an [`Error::Logic`] since the only reason for it is poisoning
pub(crate) fn acquire_lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    match mutex.lock() {
        Ok(guard) => Ok(guard),
        Err(_) => Err(Error::Logic {
            reason: format!("Unable to acquire lock for {} - poisoned...", what),
        }),
    }
}

/// Equality with type coercion between numbers, numeric strings and booleans.
/// `1`, `1.0`, `"1"` and `true` are all loosely equal to each other.
pub fn loosely_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Object(_), _) | (_, Value::Object(_)) => a == b,
        (Value::Array(_), _) | (_, Value::Array(_)) => a == b,
        _ => match (as_number(a), as_number(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whether a value counts as "set" (not null, false, 0, NaN or an empty string)
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0 && !n.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Default id generator: `max(numeric ids) + 1`, or 1 for an empty fixture set.
/// Non numeric ids are ignored. Past `i64::MAX` the id continues as an unsigned number.
pub fn next_numeric_id(records: &[Value]) -> Value {
    let max = records
        .iter()
        .filter_map(|r| r.get("id"))
        .filter_map(|id| match id {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        })
        .max();

    match max {
        Some(m) => m
            .checked_add(1)
            .map(Value::from)
            .unwrap_or_else(|| Value::from(m.unsigned_abs() + 1)),
        None => Value::from(1),
    }
}

/// Id generator for fixture sets keyed by alphanumeric strings
pub fn alphanumeric_id(len: usize) -> impl Fn(&[Value]) -> Value + Send + Sync + Clone {
    move |_: &[Value]| Value::String(generate_random_ascii_string(len))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{alphanumeric_id, is_truthy, loosely_equals, next_numeric_id};

    #[test]
    fn loose_equality() {
        assert!(loosely_equals(&json!(1), &json!("1")));
        assert!(loosely_equals(&json!("2"), &json!(2.0)));
        assert!(loosely_equals(&json!(1), &json!(true)));
        assert!(loosely_equals(&json!("abc"), &json!("abc")));
        assert!(!loosely_equals(&json!(1), &json!("one")));
        assert!(!loosely_equals(&json!(0), &json!(null)));
        assert!(!loosely_equals(&json!("1"), &json!("01")));
    }

    #[test]
    fn truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!(0.0)] {
            assert!(!is_truthy(&falsy), "{} should be falsy", falsy);
        }
        for truthy in [json!(1), json!("0"), json!([]), json!({}), json!(true)] {
            assert!(is_truthy(&truthy), "{} should be truthy", truthy);
        }
    }

    #[test]
    fn next_id() {
        assert_eq!(next_numeric_id(&[]), json!(1));
        assert_eq!(
            next_numeric_id(&[json!({"id": 3}), json!({"id": "7"}), json!({"id": "x"})]),
            json!(8)
        );
        assert_eq!(next_numeric_id(&[json!({"title": "no id"})]), json!(1));
    }

    #[test]
    fn next_id_past_i64_max() {
        let next = next_numeric_id(&[json!({ "id": i64::MAX })]);
        assert_eq!(next, json!(i64::MAX as u64 + 1));
        assert_ne!(next, json!(i64::MAX));
    }

    #[test]
    fn alphanumeric() {
        let generator = alphanumeric_id(12);
        let id = generator(&[]);
        assert_eq!(id.as_str().unwrap().len(), 12);
    }
}
