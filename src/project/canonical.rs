//! Canonical serialization used to decide whether a project changed.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Rebuild a JSON value with object keys in sorted order, recursively.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Canonical JSON text for any serializable value.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&canonicalize(value))
}

/// Hex encoded SHA-256 of the canonical JSON text.
pub fn fingerprint<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json = canonical_json(value)?;
    Ok(hex::encode(Sha256::digest(json.as_bytes())))
}
