//! Top-level field access on entity payloads.
//!
//! Object payloads are addressed by key. A payload that is not an object is
//! addressed as a whole through the pseudo-field [`WHOLE_VALUE`].

use serde_json::{Map, Value};

/// Pseudo-field naming an entire non-object payload.
pub const WHOLE_VALUE: &str = "value";

/// Value of `field`, with missing fields reading as null.
pub fn get(payload: &Value, field: &str) -> Value {
    match payload {
        Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
        Value::Null => Value::Null,
        other if field == WHOLE_VALUE => other.clone(),
        _ => Value::Null,
    }
}

/// Write `field`, turning a null payload into an object.
pub fn set(payload: &mut Value, field: &str, value: Value) {
    match payload {
        Value::Object(map) => {
            map.insert(field.to_string(), value);
        }
        Value::Null if field != WHOLE_VALUE => {
            let mut map = Map::new();
            map.insert(field.to_string(), value);
            *payload = Value::Object(map);
        }
        _ if field == WHOLE_VALUE => *payload = value,
        _ => {}
    }
}

/// Remove `field`. Returns whether anything was removed.
pub fn remove(payload: &mut Value, field: &str) -> bool {
    match payload {
        Value::Object(map) => map.remove(field).is_some(),
        Value::Null => false,
        _ if field == WHOLE_VALUE => {
            *payload = Value::Null;
            true
        }
        _ => false,
    }
}

/// Whether the payload carries no fields at all.
pub fn is_empty(payload: &Value) -> bool {
    match payload {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

/// Shallow-merge `patch` over `base`. A non-object patch replaces `base`.
pub fn merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut out = base.clone();
            for (k, v) in patch {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        (_, Value::Null) => base.clone(),
        (_, patch) => patch.clone(),
    }
}

/// Top-level field names of a payload.
pub fn names(payload: &Value) -> Vec<String> {
    match payload {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Null => Vec::new(),
        _ => vec![WHOLE_VALUE.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_field_reads_null() {
        assert_eq!(get(&json!({"a": 1}), "b"), Value::Null);
        assert_eq!(get(&json!(5), WHOLE_VALUE), json!(5));
    }

    #[test]
    fn test_set_on_null_creates_object() {
        let mut v = Value::Null;
        set(&mut v, "name", json!("x"));
        assert_eq!(v, json!({"name": "x"}));
    }

    #[test]
    fn test_remove_then_empty() {
        let mut v = json!({"name": "x"});
        assert!(remove(&mut v, "name"));
        assert!(is_empty(&v));
        assert!(!remove(&mut v, "name"));
    }

    #[test]
    fn test_merge_overlays_patch() {
        let merged = merge(&json!({"a": 1, "b": 2}), &json!({"b": 3, "c": 4}));
        assert_eq!(merged, json!({"a": 1, "b": 3, "c": 4}));
        assert_eq!(merge(&json!({"a": 1}), &Value::Null), json!({"a": 1}));
    }
}
