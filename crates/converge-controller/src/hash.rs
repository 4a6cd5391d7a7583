//! Change-hash gate
//!
//! Content hashes decide when expensive or disruptive work must re-run. The
//! status record keeps the last observed hash per key; a new hash that differs
//! from the recorded one (or has no recorded predecessor) counts as a change.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Aggregate hash over all rendered secrets and config
pub const INPUT_HASH: &str = "input";

/// Hash of the inputs the last migration job ran with
pub const MIGRATION_HASH: &str = "migration";

/// Hash of the asset image reference last imported
pub const ASSET_HASH: &str = "asset-import";

/// Stable content hash of a value.
///
/// The value is first brought into a canonical JSON form in which every map
/// is key-sorted, so identical content hashes identically regardless of the
/// order it was built in.
pub fn hash_of<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(hash_bytes(&bytes))
}

/// Hex encoded SHA-256 of raw bytes
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Records `new_hash` under `key`, returning `true` iff it differs from the
/// recorded hash. A missing entry always counts as changed.
pub fn compare_and_set(hashes: &mut BTreeMap<String, String>, key: &str, new_hash: &str) -> bool {
    if hashes.get(key).map(String::as_str) == Some(new_hash) {
        return false;
    }
    hashes.insert(key.to_string(), new_hash.to_string());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_compare_and_set_changes_once() {
        let mut hashes = BTreeMap::new();
        let abc = hash_of("abc").unwrap();

        assert!(compare_and_set(&mut hashes, "k", &abc));
        assert!(!compare_and_set(&mut hashes, "k", &abc));
        assert!(!compare_and_set(&mut hashes, "k", &hash_of("abc").unwrap()));
        assert_eq!(hashes.get("k"), Some(&abc));
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(hash_of("abc").unwrap(), hash_of("abd").unwrap());
    }

    #[test]
    fn test_map_hash_ignores_construction_order() {
        let mut forward = HashMap::new();
        forward.insert("a", "1");
        forward.insert("b", "2");
        forward.insert("c", "3");

        let mut backward = HashMap::new();
        backward.insert("c", "3");
        backward.insert("b", "2");
        backward.insert("a", "1");

        let ordered: BTreeMap<_, _> = [("b", "2"), ("a", "1"), ("c", "3")].into_iter().collect();

        assert_eq!(hash_of(&forward).unwrap(), hash_of(&backward).unwrap());
        assert_eq!(hash_of(&forward).unwrap(), hash_of(&ordered).unwrap());
    }

    #[test]
    fn test_new_key_counts_as_changed() {
        let mut hashes = BTreeMap::new();
        hashes.insert("input".to_string(), "x".to_string());

        assert!(compare_and_set(&mut hashes, MIGRATION_HASH, "x"));
    }

    #[test]
    fn test_hash_bytes_is_hex_sha256() {
        let digest = hash_bytes(b"");
        assert_eq!(digest.len(), 64);
        assert!(digest.starts_with("e3b0c442"));
    }
}
