//! Content-addressed cache for compiled artifacts.
//!
//! Every expensive step (script compile, template compile, style compile,
//! code transform) is wrapped in [`with_cache`]. The key is a sha-256 over
//! the semantic inputs of the step; the payload is JSON so that a backend
//! may persist it across processes.

use crate::error::{LoadError, LoadResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use vize_carton::hash::PartsDigest;
use vize_carton::FxHashMap;

const TAG_TEXT: u8 = b's';
const TAG_NONE: u8 = b'n';
const TAG_FLAG: u8 = b'b';
const TAG_LIST: u8 = b'l';
const TAG_JSON: u8 = b'j';

/// Error reported by a cache backend.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct CacheError(pub String);

impl From<CacheError> for LoadError {
    fn from(err: CacheError) -> Self {
        LoadError::CacheBackend(err.0)
    }
}

/// Storage for compiled artifacts, keyed by hex digest.
#[async_trait(?Send)]
pub trait CacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;
}

/// In-process cache backend.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RefCell<FxHashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Entries sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.borrow_mut().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.borrow_mut().remove(key)
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[async_trait(?Send)]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.insert(key, value);
        Ok(())
    }
}

/// Builder for a cache key.
///
/// Parts are hashed in order. Each part carries a type tag and a length
/// prefix, so `text("ab").text("c")`, `text("a").text("bc")` and
/// `opt(None)` vs `text("")` all differ.
///
/// A part that cannot be fingerprinted marks the key uncacheable:
/// [`with_cache`] then computes without touching the backend.
#[derive(Clone)]
pub struct CacheKey {
    digest: PartsDigest,
    cacheable: bool,
}

impl CacheKey {
    /// Start a key for one kind of artifact. The crate version is always
    /// the first part.
    pub fn new(kind: &str) -> Self {
        Self {
            digest: PartsDigest::new(),
            cacheable: true,
        }
        .text(crate::VERSION)
        .text(kind)
    }

    pub fn text(mut self, part: &str) -> Self {
        self.digest.update(&[TAG_TEXT]);
        self.digest.update(part.as_bytes());
        self
    }

    pub fn opt(self, part: Option<&str>) -> Self {
        match part {
            Some(part) => self.text(part),
            None => self.tag(TAG_NONE),
        }
    }

    pub fn flag(mut self, part: bool) -> Self {
        self.digest.update(&[TAG_FLAG]);
        self.digest.update(&[u8::from(part)]);
        self
    }

    pub fn list<I>(mut self, parts: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let parts: Vec<I::Item> = parts.into_iter().collect();
        self.digest.update(&[TAG_LIST]);
        self.digest.update(&(parts.len() as u64).to_le_bytes());
        for part in &parts {
            self.digest.update(part.as_ref().as_bytes());
        }
        self
    }

    /// Fingerprint of a serializable option value.
    pub fn json<T: Serialize + ?Sized>(mut self, part: &T) -> Self {
        match serde_json::to_vec(part) {
            Ok(encoded) => {
                self.digest.update(&[TAG_JSON]);
                self.digest.update(&encoded);
            }
            Err(e) => {
                tracing::warn!(error = %e, "key part is not serializable, caching disabled");
                self.cacheable = false;
            }
        }
        self
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Hex digest (64 characters).
    pub fn finish(self) -> String {
        self.digest.finish_hex()
    }

    fn tag(mut self, tag: u8) -> Self {
        self.digest.update(&[tag]);
        self
    }
}

/// Handle given to a compute step to veto storing its own result.
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    prevented: Rc<Cell<bool>>,
}

impl CacheControl {
    /// Do not store the result of the current computation.
    pub fn prevent_cache(&self) {
        self.prevented.set(true);
    }

    pub fn is_prevented(&self) -> bool {
        self.prevented.get()
    }
}

/// Memoize `compute` under `key`.
///
/// Without a backend, or with an uncacheable key, `compute` always runs.
/// A failed computation, or one
/// that called [`CacheControl::prevent_cache`], is returned but not stored.
/// A stored payload that no longer decodes counts as a miss.
pub async fn with_cache<T, F, Fut>(
    cache: Option<&dyn CacheBackend>,
    key: CacheKey,
    compute: F,
) -> LoadResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(CacheControl) -> Fut,
    Fut: Future<Output = LoadResult<T>>,
{
    let Some(cache) = cache.filter(|_| key.is_cacheable()) else {
        return compute(CacheControl::default()).await;
    };

    let key = key.finish();
    if let Some(payload) = cache.get(&key).await? {
        match serde_json::from_str::<T>(&payload) {
            Ok(value) => {
                tracing::debug!(key = %key, "cache hit");
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry");
            }
        }
    }

    tracing::debug!(key = %key, "cache miss");
    let control = CacheControl::default();
    let value = compute(control.clone()).await?;
    if control.is_prevented() {
        tracing::debug!(key = %key, "cache write prevented");
        return Ok(value);
    }

    match serde_json::to_string(&value) {
        Ok(payload) => cache.set(&key, payload).await?,
        Err(e) => tracing::warn!(key = %key, error = %e, "cannot serialize artifact"),
    }
    Ok(value)
}
