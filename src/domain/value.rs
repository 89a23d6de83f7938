//! Structural comparison and canonical serialization of JSON values
//!
//! Rule bodies are matched by value, not by bytes: object key order never
//! matters, array order always does, and `1` equals `1.0`.

use serde_json::{Map, Number, Value};
use std::fmt::Write;

/// Recursive deep equality over the closed set of JSON value kinds.
pub fn deep_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => objects_equal(a, b),
        _ => false,
    }
}

fn objects_equal(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| deep_equal(value, other)))
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Serialize a value so that deep-equal values produce identical text.
///
/// Object keys are emitted in sorted order and integral floats are written
/// as integers.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

const MAX_EXACT_FLOAT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn write_number(n: &Number, out: &mut String) {
    if n.is_i64() || n.is_u64() {
        let _ = write!(out, "{n}");
        return;
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT_INTEGER => {
            let _ = write!(out, "{}", f as i64);
        }
        _ => {
            let _ = write!(out, "{n}");
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail.
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_key_order_is_irrelevant() {
        assert!(deep_equal(&json!({"a": 1, "b": 2}), &json!({"b": 2, "a": 1})));
    }

    #[test]
    fn test_array_order_is_relevant() {
        assert!(deep_equal(&json!([1, 2]), &json!([1, 2])));
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn test_nested_structures() {
        let left = json!({"user": {"tags": ["x", "y"], "age": 3}, "ok": true});
        let right = json!({"ok": true, "user": {"age": 3, "tags": ["x", "y"]}});
        assert!(deep_equal(&left, &right));

        let changed = json!({"ok": true, "user": {"age": 3, "tags": ["y", "x"]}});
        assert!(!deep_equal(&left, &changed));
    }

    #[test]
    fn test_kinds_never_coerce() {
        assert!(!deep_equal(&json!("1"), &json!(1)));
        assert!(!deep_equal(&json!(null), &json!(false)));
        assert!(!deep_equal(&json!({}), &json!([])));
    }

    #[test]
    fn test_extra_keys_break_equality() {
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!deep_equal(&json!({"a": 1, "b": 2}), &json!({"a": 1})));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(deep_equal(&json!(1), &json!(1.0)));
        assert!(deep_equal(&json!(-5), &json!(-5)));
        assert!(!deep_equal(&json!(1), &json!(1.5)));
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        assert_eq!(
            canonical_json(&json!({"b": [1, {"d": null, "c": "x"}], "a": true})),
            r#"{"a":true,"b":[1,{"c":"x","d":null}]}"#
        );
    }

    #[test]
    fn test_canonical_json_agrees_with_deep_equal_on_numbers() {
        assert_eq!(canonical_json(&json!(2.0)), canonical_json(&json!(2)));
        assert_eq!(canonical_json(&json!(2.5)), "2.5");
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        assert_eq!(canonical_json(&json!("a\"b")), r#""a\"b""#);
    }
}
