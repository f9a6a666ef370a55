//! Idempotency key derivation.
//!
//! The key is derived exactly once, at enqueue time, and never regenerated:
//! every retry of the same queued operation submits the same key, which is
//! what lets the server collapse repeated submissions of one logical intent.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Derive a collision-resistant idempotency key.
///
/// SHA-256 over the operation name, serialized payload, enqueue timestamp
/// and a random nonce, with a separator byte between fields so adjacent
/// fields cannot alias each other. The nonce keeps two enqueues of an
/// identical payload in the same instant distinct: they are distinct user
/// intents and must not be collapsed by the server.
#[must_use]
pub fn derive(
    operation_name: &str,
    payload: &serde_json::Value,
    enqueued_at: DateTime<Utc>,
    nonce: Uuid,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(enqueued_at.to_rfc3339().as_bytes());
    hasher.update([0u8]);
    hasher.update(nonce.as_bytes());

    let digest = hasher.finalize();
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_stable_for_same_inputs() {
        let at = Utc::now();
        let nonce = Uuid::new_v4();
        let payload = json!({"sku": "malt-pilsner", "delta": -25});

        let a = derive("adjust_inventory", &payload, at, nonce);
        let b = derive("adjust_inventory", &payload, at, nonce);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_differs_per_nonce() {
        let at = Utc::now();
        let payload = json!({"sku": "malt-pilsner", "delta": -25});

        let a = derive("adjust_inventory", &payload, at, Uuid::new_v4());
        let b = derive("adjust_inventory", &payload, at, Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_differs_per_operation_name() {
        let at = Utc::now();
        let nonce = Uuid::new_v4();
        let payload = json!({"id": "batch-7"});

        let a = derive("update_batch", &payload, at, nonce);
        let b = derive("adjust_inventory", &payload, at, nonce);
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_is_hex_of_sha256() {
        let key = derive("update_batch", &json!({}), Utc::now(), Uuid::new_v4());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
