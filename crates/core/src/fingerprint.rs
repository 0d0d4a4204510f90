//! Content fingerprints for declared configuration.
//!
//! A fingerprint is a truncated SHA-256 of the JSON serialization of a value.
//! Serialization is deterministic: struct fields serialize in declaration
//! order and every map in the normalized model is a `BTreeMap`, so two
//! declarations that differ only in input ordering hash identically.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Truncation length. Short enough to embed in an image tag, long enough
/// that collisions within one host's deployments are not a concern.
const FINGERPRINT_LEN: usize = 12;

/// An opaque digest of declared configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Fingerprint any serializable value.
///
/// Serialization of the normalized model cannot fail; should it ever, the
/// value hashes as empty input rather than aborting a reconciliation.
pub fn fingerprint_of<T: Serialize>(value: &T) -> Fingerprint {
  let serialized = serde_json::to_vec(value).unwrap_or_default();
  let mut hasher = Sha256::new();
  hasher.update(&serialized);
  let full = hex::encode(hasher.finalize());
  Fingerprint(full[..FINGERPRINT_LEN].to_string())
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;

  #[test]
  fn fingerprint_is_deterministic() {
    let value = vec!["a".to_string(), "b".to_string()];
    assert_eq!(fingerprint_of(&value), fingerprint_of(&value));
  }

  #[test]
  fn fingerprint_changes_with_content() {
    assert_ne!(fingerprint_of(&"one"), fingerprint_of(&"two"));
  }

  #[test]
  fn fingerprint_has_fixed_length() {
    assert_eq!(fingerprint_of(&42).0.len(), FINGERPRINT_LEN);
  }

  #[test]
  fn map_key_order_does_not_matter() {
    let mut first = BTreeMap::new();
    first.insert("b", "2");
    first.insert("a", "1");

    let mut second = BTreeMap::new();
    second.insert("a", "1");
    second.insert("b", "2");

    assert_eq!(fingerprint_of(&first), fingerprint_of(&second));
  }
}
