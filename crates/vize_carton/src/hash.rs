//! Hashing utilities.
//!
//! Two families live here:
//!
//! - xxHash3 for short, non-cryptographic scope id fingerprints,
//! - sha-256 for cache keys that may be persisted by an external store and
//!   therefore must stay collision resistant across processes.

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_64;

/// 8 hex characters taken from the low 32 bits of the xxHash3 of `data`.
///
/// Used for `data-v-xxxxxxxx` scope attributes.
#[inline]
pub fn short_hash(data: &str) -> String {
    format!("{:08x}", xxh3_64(data.as_bytes()) & 0xFFFF_FFFF)
}

/// Incremental sha-256 over a sequence of framed parts.
///
/// Every part is prefixed with its byte length so that `["ab", "c"]` and
/// `["a", "bc"]` produce different digests.
#[derive(Default, Clone)]
pub struct PartsDigest {
    hasher: Sha256,
}

impl PartsDigest {
    /// Create an empty digest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one framed part.
    pub fn update(&mut self, part: &[u8]) {
        self.hasher.update((part.len() as u64).to_le_bytes());
        self.hasher.update(part);
    }

    /// Finish and return the lowercase hex digest (64 characters).
    pub fn finish_hex(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}
