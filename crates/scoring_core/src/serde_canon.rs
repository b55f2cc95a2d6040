//! Canonical JSON serialization for deterministic hashing
//!
//! Model artifacts are persisted with sorted map keys and no whitespace so
//! that identical training runs produce byte-identical files and the same
//! Blake3 digest.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanonicalError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let json_value = serde_json::to_value(value)
        .map_err(|e| CanonicalError::SerializationError(e.to_string()))?;

    let canonical = canonicalize_value(&json_value);
    serde_json::to_string(&canonical).map_err(|e| CanonicalError::SerializationError(e.to_string()))
}

/// Canonicalize a JSON value by sorting all object keys recursively
fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut btree = BTreeMap::new();
            for (k, v) in map {
                btree.insert(k.clone(), canonicalize_value(v));
            }
            serde_json::Value::Object(btree.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

/// Compute Blake3 hash of the canonical JSON representation
pub fn hash_canonical<T: Serialize>(value: &T) -> Result<[u8; 32], CanonicalError> {
    let json = to_canonical_json(value)?;
    Ok(*blake3::hash(json.as_bytes()).as_bytes())
}

/// Compute Blake3 hash and return it as a hex string
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    Ok(hex::encode(hash_canonical(value)?))
}
