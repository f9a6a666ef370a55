//! Field-level merge suggestions for data conflicts.
//!
//! The policy is deliberately simple and deterministic:
//! - timestamp-like fields (both sides parse as RFC 3339): the newer wins
//! - array fields: union, local order first, then unseen server elements
//! - everything else: local wins unless the values are already equal
//! - fields present on only one side are carried through
//!
//! Known limitation, preserved as documented behavior: on scalar fields that
//! are neither timestamps nor arrays, a concurrent server edit loses to the
//! local value even when the server edit was the later one.

use chrono::DateTime;
use serde_json::{Map, Value};

/// Compute a merge suggestion from local and server snapshots.
///
/// When both snapshots are JSON objects the merge is field-by-field. For any
/// other shape there is no field structure to reconcile, and the local value
/// stands as the suggestion.
#[must_use]
pub fn suggest_merge(local: &Value, server: &Value) -> Value {
    match (local, server) {
        (Value::Object(l), Value::Object(s)) => Value::Object(merge_objects(l, s)),
        _ => local.clone(),
    }
}

fn merge_objects(local: &Map<String, Value>, server: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = Map::new();

    for (key, local_value) in local {
        let value = match server.get(key) {
            Some(server_value) if server_value != local_value => {
                merge_field(local_value, server_value)
            },
            _ => local_value.clone(),
        };
        merged.insert(key.clone(), value);
    }

    // Server-only fields are carried through
    for (key, server_value) in server {
        if !local.contains_key(key) {
            merged.insert(key.clone(), server_value.clone());
        }
    }

    merged
}

/// Resolve a single field where local and server disagree.
fn merge_field(local: &Value, server: &Value) -> Value {
    if let (Some(local_ts), Some(server_ts)) = (as_timestamp(local), as_timestamp(server)) {
        // Newer timestamp wins; local wins a tie
        return if server_ts > local_ts {
            server.clone()
        } else {
            local.clone()
        };
    }

    if let (Value::Array(local_items), Value::Array(server_items)) = (local, server) {
        return Value::Array(union_arrays(local_items, server_items));
    }

    // Scalar disagreement: local expresses user intent
    local.clone()
}

/// Parse a value as an RFC 3339 timestamp, the encoding the store itself
/// uses. Field names are deliberately not consulted.
fn as_timestamp(value: &Value) -> Option<DateTime<chrono::FixedOffset>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Local order first, then server elements not already present.
fn union_arrays(local: &[Value], server: &[Value]) -> Vec<Value> {
    let mut out = local.to_vec();
    for item in server {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_determinism() {
        let local = json!({"a": 1, "b": [1, 2], "updated_at": "2024-06-01T12:00:00Z"});
        let server = json!({"a": 2, "b": [2, 3], "updated_at": "2024-06-01T11:00:00Z"});

        let merged = suggest_merge(&local, &server);

        assert_eq!(
            merged,
            json!({"a": 1, "b": [1, 2, 3], "updated_at": "2024-06-01T12:00:00Z"})
        );
    }

    #[test]
    fn test_newer_server_timestamp_wins() {
        let local = json!({"updated_at": "2024-06-01T10:00:00Z"});
        let server = json!({"updated_at": "2024-06-01T11:00:00Z"});

        let merged = suggest_merge(&local, &server);
        assert_eq!(merged, json!({"updated_at": "2024-06-01T11:00:00Z"}));
    }

    #[test]
    fn test_timestamp_tie_prefers_local() {
        // Same instant, different offsets
        let local = json!({"updated_at": "2024-06-01T12:00:00+02:00"});
        let server = json!({"updated_at": "2024-06-01T10:00:00Z"});

        let merged = suggest_merge(&local, &server);
        assert_eq!(merged, json!({"updated_at": "2024-06-01T12:00:00+02:00"}));
    }

    #[test]
    fn test_one_sided_fields_carried_through() {
        let local = json!({"a": 1, "only_local": true});
        let server = json!({"a": 1, "only_server": "kept"});

        let merged = suggest_merge(&local, &server);
        assert_eq!(
            merged,
            json!({"a": 1, "only_local": true, "only_server": "kept"})
        );
    }

    #[test]
    fn test_scalar_conflict_prefers_local() {
        let local = json!({"gravity": 1.048});
        let server = json!({"gravity": 1.052});

        let merged = suggest_merge(&local, &server);
        assert_eq!(merged, json!({"gravity": 1.048}));
    }

    #[test]
    fn test_array_union_dedupes_objects() {
        let local = json!({"readings": [{"day": 1}, {"day": 2}]});
        let server = json!({"readings": [{"day": 2}, {"day": 3}]});

        let merged = suggest_merge(&local, &server);
        assert_eq!(
            merged,
            json!({"readings": [{"day": 1}, {"day": 2}, {"day": 3}]})
        );
    }

    #[test]
    fn test_non_object_snapshots_fall_back_to_local() {
        let local = json!([1, 2, 3]);
        let server = json!({"a": 1});

        assert_eq!(suggest_merge(&local, &server), json!([1, 2, 3]));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let local = json!({"a": 1, "b": [1, 2], "c": "x"});
        let server = json!({"a": 2, "b": [3], "c": "y"});

        let first = suggest_merge(&local, &server);
        let second = suggest_merge(&local, &server);
        assert_eq!(first, second);
    }
}
