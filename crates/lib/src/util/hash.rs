//! Hashing utilities for content-addressed configurations.
//!
//! This module provides:
//! - `Checksum`: a full 64-character SHA-256 hex digest
//! - `Hashable`: checksum of any serializable value via its JSON form
//! - `hash_bytes()`: arbitrary byte hashing

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::CHECKSUM_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A content-addressed checksum.
///
/// Configurations, configuration keys and workspace files are identified by
/// the SHA-256 of a canonical serialization. Two values with the same
/// checksum are interchangeable.
///
/// # Format
///
/// A lowercase hexadecimal string of 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Checksum(pub String);

impl Checksum {
  /// Leading characters used in log lines and display strings.
  pub fn short(&self) -> &str {
    let len = self.0.len().min(CHECKSUM_PREFIX_LEN);
    &self.0[..len]
  }
}

impl std::fmt::Display for Checksum {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<Checksum, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(hash_bytes(serialized.as_bytes()))
  }
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA-256 hash.
pub fn hash_bytes(data: &[u8]) -> Checksum {
  let mut hasher = Sha256::new();
  hasher.update(data);
  Checksum(hex::encode(hasher.finalize()))
}
