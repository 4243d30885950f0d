//! Content hashing for dedup keys: node args, task args, arg mappings,
//! and the dag as a whole all hash to a 64-hex-char SHA-256 digest over a
//! canonical byte encoding of sorted `(key, value)` pairs. Same inputs,
//! same hash, regardless of insertion order — lets two clients bind the
//! same node/task/dag without coordinating first.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Hash a sorted string-keyed map. `BTreeMap` already iterates in key
/// order, so this just needs a canonical separator scheme that can't
/// collide across different splits of the same bytes.
pub fn hash_pairs<V: AsRef<str>>(pairs: &BTreeMap<String, V>) -> String {
    let mut hasher = Sha256::new();
    for (k, v) in pairs {
        hasher.update((k.len() as u64).to_le_bytes());
        hasher.update(k.as_bytes());
        let v = v.as_ref();
        hasher.update((v.len() as u64).to_le_bytes());
        hasher.update(v.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hash an ordered list of already-sorted strings (e.g. a dag's sorted
/// node hashes), with the same length-prefixed framing as [`hash_pairs`].
pub fn hash_sorted_list<S: AsRef<str>>(items: &[S]) -> String {
    let mut hasher = Sha256::new();
    for item in items {
        let s = item.as_ref();
        hasher.update((s.len() as u64).to_le_bytes());
        hasher.update(s.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), "2".to_string());
        a.insert("a".to_string(), "1".to_string());

        let mut b = BTreeMap::new();
        b.insert("a".to_string(), "1".to_string());
        b.insert("b".to_string(), "2".to_string());

        assert_eq!(hash_pairs(&a), hash_pairs(&b));
    }

    #[test]
    fn hash_changes_with_value() {
        let mut a = BTreeMap::new();
        a.insert("a".to_string(), "1".to_string());
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), "2".to_string());

        assert_ne!(hash_pairs(&a), hash_pairs(&b));
    }

    #[test]
    fn digest_is_64_hex_chars() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), "y".to_string());
        assert_eq!(hash_pairs(&a).len(), 64);
    }
}
