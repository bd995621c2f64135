//! Carton - The artist's toolbox for Vize.
//!
//! This crate provides the small shared utilities every other crate of the
//! runtime loader reaches for, much like a carton (artist's portfolio case)
//! holds the essential tools an artist carries from studio to gallery.
//!
//! # Modules
//!
//! - **hash**: xxHash3 fingerprints for scope ids and sha-256 digests for
//!   persistent cache keys
//!
//! # Example
//!
//! ```
//! use vize_carton::{hash::short_hash, FxHashMap};
//!
//! let mut seen: FxHashMap<&str, String> = FxHashMap::default();
//! seen.insert("/main.vue", short_hash("/main.vue"));
//! assert_eq!(seen["/main.vue"].len(), 8);
//! ```

pub mod hash;

// Re-export compact_str::CompactString for convenience
pub use compact_str::{format_compact, CompactString, ToCompactString};

// Re-export rustc-hash for fast hash maps/sets
pub use rustc_hash::{FxHashMap, FxHashSet};
