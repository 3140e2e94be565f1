//! Derivative semantic equality for reconciled objects
//!
//! Update decisions compare the desired object against the live one with
//! derivative semantics: fields the controller does not set (null, empty
//! maps, empty lists) match anything, so server-side defaulting never causes
//! write amplification. Only a real difference in a field the controller
//! cares about triggers an update.

use serde::Serialize;
use serde_json::Value;

/// Compare two serializable values with derivative semantics.
///
/// Returns true when `expected` is a derivative of `current`, i.e. every
/// non-empty field of `expected` is present and equal in `current`.
pub fn derivative_eq<T: Serialize>(expected: &T, current: &T) -> bool {
    let expected = serde_json::to_value(expected).unwrap_or(Value::Null);
    let current = serde_json::to_value(current).unwrap_or(Value::Null);
    is_derivative(&expected, &current)
}

/// Core derivative comparison on JSON values.
///
/// - null / empty object / empty array in `expected` matches anything;
/// - objects compare key-wise, ignoring empty expected values;
/// - arrays must have equal length and compare element-wise;
/// - scalars compare by equality.
pub fn is_derivative(expected: &Value, current: &Value) -> bool {
    match expected {
        Value::Null => true,
        Value::Object(map) => {
            if map.is_empty() {
                return true;
            }
            let Value::Object(curr) = current else {
                return false;
            };
            map.iter().all(|(key, value)| {
                if is_empty_value(value) {
                    return true;
                }
                curr.get(key).is_some_and(|c| is_derivative(value, c))
            })
        }
        Value::Array(items) => {
            if items.is_empty() {
                return true;
            }
            let Value::Array(curr) = current else {
                return false;
            };
            items.len() == curr.len()
                && items.iter().zip(curr).all(|(e, c)| is_derivative(e, c))
        }
        scalar => scalar == current,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Derivative comparison over optional label/annotation maps
pub fn maps_derivative_eq(
    expected: Option<&std::collections::BTreeMap<String, String>>,
    current: Option<&std::collections::BTreeMap<String, String>>,
) -> bool {
    let Some(expected) = expected else { return true };
    if expected.is_empty() {
        return true;
    }
    let Some(current) = current else { return false };
    expected
        .iter()
        .all(|(k, v)| current.get(k).is_some_and(|c| c == v))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_and_empty_match_anything() {
        assert!(is_derivative(&Value::Null, &json!({"a": 1})));
        assert!(is_derivative(&json!({}), &json!({"a": 1})));
        assert!(is_derivative(&json!([]), &json!([1, 2, 3])));
    }

    #[test]
    fn missing_expected_keys_are_ignored_but_set_keys_must_match() {
        let expected = json!({"replicas": 3, "paused": null});
        assert!(is_derivative(&expected, &json!({"replicas": 3, "paused": true})));
        assert!(is_derivative(&expected, &json!({"replicas": 3})));
        assert!(!is_derivative(&expected, &json!({"replicas": 2})));
        assert!(!is_derivative(&expected, &json!({})));
    }

    #[test]
    fn nested_objects_compare_recursively() {
        let expected = json!({"template": {"metadata": {"labels": {"app": "x"}}}});
        let current = json!({
            "template": {
                "metadata": {"labels": {"app": "x", "extra": "server-added"}},
                "spec": {"nodeName": "defaulted"}
            }
        });
        assert!(is_derivative(&expected, &current));

        let drifted = json!({"template": {"metadata": {"labels": {"app": "y"}}}});
        assert!(!is_derivative(&drifted, &current));
    }

    #[test]
    fn arrays_require_same_length_and_elementwise_match() {
        let expected = json!([{"name": "grpc", "port": 9002}]);
        let padded = json!([{"name": "grpc", "port": 9002, "protocol": "TCP"}]);
        assert!(is_derivative(&expected, &padded));

        let longer = json!([
            {"name": "grpc", "port": 9002},
            {"name": "metrics", "port": 9090}
        ]);
        assert!(!is_derivative(&expected, &longer));
    }

    #[test]
    fn scalars_compare_by_equality() {
        assert!(is_derivative(&json!("a"), &json!("a")));
        assert!(!is_derivative(&json!("a"), &json!("b")));
        assert!(is_derivative(&json!(10), &json!(10)));
        assert!(!is_derivative(&json!(10), &json!(11)));
    }

    #[test]
    fn label_maps_ignore_server_added_entries() {
        use std::collections::BTreeMap;
        let expected = BTreeMap::from([("a".to_string(), "1".to_string())]);
        let current = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("injected".to_string(), "by-webhook".to_string()),
        ]);
        assert!(maps_derivative_eq(Some(&expected), Some(&current)));
        assert!(maps_derivative_eq(None, Some(&current)));
        assert!(!maps_derivative_eq(Some(&expected), None));

        let drifted = BTreeMap::from([("a".to_string(), "2".to_string())]);
        assert!(!maps_derivative_eq(Some(&expected), Some(&drifted)));
    }
}
