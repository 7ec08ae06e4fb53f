//! Hashing - SHA-256 over canonical JSON
//!
//! Identical inputs must produce identical hashes across runs.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

/// SHA-256 of bytes as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Canonical JSON: sorted keys, no whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(v))
}

fn sort_value(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_value(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_value).collect()),
        other => other,
    }
}

/// Hash of an emitted document (with its own hash field blanked).
pub fn compute_document_hash<T: Serialize>(document: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(document)?.as_bytes()))
}

/// build_hash = sha256(style_id:policy_version:canonical_deck:canonical_pages:engine_version)
pub fn compute_build_hash(
    style_id: &str,
    policy_version: &str,
    deck: &impl Serialize,
    pages: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let combined = format!(
        "{}:{}:{}:{}:{}",
        style_id,
        policy_version,
        canonical_json(deck)?,
        canonical_json(pages)?,
        engine_version
    );
    Ok(sha256_hex(combined.as_bytes()))
}
