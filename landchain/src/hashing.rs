// Copyright (c) 2024 Botho Foundation

//! Deterministic hashing primitives shared by every layer of the ledger.
//!
//! Payloads are canonicalized before hashing: they are serialized to JSON
//! with every object's keys sorted, so the same logical content always
//! hashes the same way. Block and signature hashes are lowercase
//! hex-encoded SHA-256 digests.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::block::Action;
use crate::ledger::LedgerError;

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Serialize `value` to compact JSON with object keys in sorted order.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, LedgerError> {
    let value = serde_json::to_value(value).map_err(|e| LedgerError::Encoding(e.to_string()))?;
    serde_json::to_string(&sort_keys(value)).map_err(|e| LedgerError::Encoding(e.to_string()))
}

// Rebuilding the map in key order is enough for both map backings: a
// BTreeMap sorts anyway, an insertion-ordered map keeps this order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// SHA-256 of `data`, lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a block from its already-canonicalized payload.
///
/// The miner canonicalizes the payload once and then calls this for every
/// nonce it tries.
pub fn hash_block_parts(
    index: u64,
    timestamp: &str,
    canonical_data: &str,
    previous_hash: &str,
    nonce: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string().as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(canonical_data.as_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a block's fields: `index || timestamp || canonical(data) || previous_hash || nonce`.
pub fn hash_block<T: Serialize + ?Sized>(
    index: u64,
    timestamp: &str,
    data: &T,
    previous_hash: &str,
    nonce: u64,
) -> Result<String, LedgerError> {
    let canonical = canonical_json(data)?;
    Ok(hash_block_parts(
        index,
        timestamp,
        &canonical,
        previous_hash,
        nonce,
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignaturePayload<'a> {
    admin_id: &'a str,
    admin_name: &'a str,
    action: Action,
    block_data: String,
}

/// Hash an administrator's signature over a block payload.
pub fn signature_hash<T: Serialize + ?Sized>(
    admin_id: &str,
    admin_name: &str,
    action: Action,
    block_data: &T,
) -> Result<String, LedgerError> {
    let payload = SignaturePayload {
        admin_id,
        admin_name,
        action,
        block_data: canonical_json(block_data)?,
    };
    Ok(sha256_hex(canonical_json(&payload)?.as_bytes()))
}

/// True iff `hash` is exactly 64 hex characters (either case).
pub fn verify_hash_format(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

/// True iff `hash` starts with `difficulty` `'0'` characters.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Format an instant as ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current wall-clock instant, formatted by [`format_timestamp`].
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let a = json!({"b": 1, "a": {"z": true, "y": [ {"d": 1, "c": 2} ]}});
        let b = json!({"a": {"y": [ {"c": 2, "d": 1} ], "z": true}, "b": 1});

        let ca = canonical_json(&a).unwrap();
        assert_eq!(ca, canonical_json(&b).unwrap());
        assert_eq!(ca, r#"{"a":{"y":[{"c":2,"d":1}],"z":true},"b":1}"#);
    }

    #[test]
    fn test_canonical_json_rejects_non_string_keys() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], 1u8);
        assert!(matches!(canonical_json(&map), Err(LedgerError::Encoding(_))));
    }

    #[test]
    fn test_hash_block_deterministic() {
        let data = json!({"recordId": "LR-1", "area": 100});
        let h1 = hash_block(1, "2025-01-01T00:00:00.000Z", &data, "00ab", 7).unwrap();
        let h2 = hash_block(1, "2025-01-01T00:00:00.000Z", &data, "00ab", 7).unwrap();
        assert_eq!(h1, h2);
        assert!(verify_hash_format(&h1));

        // Any single field change moves the hash
        assert_ne!(h1, hash_block(2, "2025-01-01T00:00:00.000Z", &data, "00ab", 7).unwrap());
        assert_ne!(h1, hash_block(1, "2025-01-01T00:00:00.001Z", &data, "00ab", 7).unwrap());
        assert_ne!(h1, hash_block(1, "2025-01-01T00:00:00.000Z", &data, "00ac", 7).unwrap());
        assert_ne!(h1, hash_block(1, "2025-01-01T00:00:00.000Z", &data, "00ab", 8).unwrap());
    }

    #[test]
    fn test_hash_block_matches_manual_concatenation() {
        let data = json!({"k": "v"});
        let expected = sha256_hex(b"3ts{\"k\":\"v\"}prev42");
        assert_eq!(hash_block(3, "ts", &data, "prev", 42).unwrap(), expected);
    }

    #[test]
    fn test_signature_hash_binds_every_field() {
        let data = json!({"recordId": "LR-1"});
        let base = signature_hash("a1", "Alice", Action::Approve, &data).unwrap();
        assert!(verify_hash_format(&base));
        assert_eq!(base, signature_hash("a1", "Alice", Action::Approve, &data).unwrap());
        assert_ne!(base, signature_hash("a2", "Alice", Action::Approve, &data).unwrap());
        assert_ne!(base, signature_hash("a1", "Alicia", Action::Approve, &data).unwrap());
        assert_ne!(base, signature_hash("a1", "Alice", Action::Reject, &data).unwrap());
        assert_ne!(
            base,
            signature_hash("a1", "Alice", Action::Approve, &json!({"recordId": "LR-2"})).unwrap()
        );
    }

    #[test]
    fn test_verify_hash_format() {
        assert!(verify_hash_format(&"a".repeat(64)));
        assert!(verify_hash_format(&"F".repeat(64)));
        assert!(!verify_hash_format(&"a".repeat(63)));
        assert!(!verify_hash_format(&"a".repeat(65)));
        assert!(!verify_hash_format(&"g".repeat(64)));
        assert!(!verify_hash_format(""));
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 0));
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("00ab", 3));
        assert!(!meets_difficulty("0", 2));
    }

    #[test]
    fn test_format_timestamp_millis() {
        let instant = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(instant), "2025-01-01T00:00:00.000Z");
    }
}
