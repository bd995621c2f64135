//! Module identifiers and specifier resolution.
//!
//! A [`ModuleId`] is a canonical path plus an opaque query. The query is
//! kept verbatim and never takes part in path arithmetic, so
//! `./card.vue?raw` and `./card.vue` resolve to the same path but remain
//! two distinct modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use vize_carton::CompactString;

/// Canonical identifier of a loadable unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    path: CompactString,
    query: Option<CompactString>,
}

impl ModuleId {
    /// Build an identifier from an already canonical path and query.
    pub fn new(path: impl Into<CompactString>, query: Option<&str>) -> Self {
        Self {
            path: path.into(),
            query: query.map(CompactString::from),
        }
    }

    /// Split `path?query` on the first `?` without normalizing the path.
    pub fn parse(raw: &str) -> Self {
        let (path, query) = split_query(raw);
        Self::new(path, query)
    }

    /// The root identifier `/`.
    pub fn root() -> Self {
        Self::new("/", None)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Bare names (`vue`, `lodash/merge`) are opaque external module names.
    pub fn is_bare(&self) -> bool {
        is_bare_specifier(&self.path)
    }

    /// Directory part of the path, always ending in `/`.
    ///
    /// An empty path denotes the root, exactly like `/`.
    pub fn dirname(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) if self.path.starts_with('/') => &self.path[..=idx],
            _ => "/",
        }
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    /// Lower-cased extension of the path; the query is never consulted.
    pub fn extension(&self) -> CompactString {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => CompactString::from(name[idx + 1..].to_ascii_lowercase()),
            _ => CompactString::default(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            f.write_str("?")?;
            f.write_str(query)?;
        }
        Ok(())
    }
}

impl From<&str> for ModuleId {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Turns a (referrer, specifier) pair into a canonical identifier.
///
/// Implementations must be pure: the same pair always yields the same id.
pub trait PathResolver {
    fn resolve(&self, referrer: &ModuleId, specifier: &str) -> ModuleId;
}

/// POSIX-style resolution used unless the caller plugs in their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPathResolver;

impl PathResolver for DefaultPathResolver {
    fn resolve(&self, referrer: &ModuleId, specifier: &str) -> ModuleId {
        resolve(referrer, specifier)
    }
}

/// Resolve `specifier` against `referrer`.
///
/// - `./x` and `../x` are joined to the referrer's directory,
/// - `/x` is normalized as is,
/// - bare names are returned unchanged.
pub fn resolve(referrer: &ModuleId, specifier: &str) -> ModuleId {
    let (path, query) = split_query(specifier);

    if is_relative_specifier(path) {
        let mut joined = String::with_capacity(referrer.dirname().len() + path.len());
        joined.push_str(referrer.dirname());
        joined.push_str(path);
        ModuleId::new(normalize(&joined), query)
    } else if path.starts_with('/') {
        ModuleId::new(normalize(path), query)
    } else {
        ModuleId::new(path, query)
    }
}

/// Collapse `.`, `..` and empty segments of a rooted path.
///
/// `..` above the root stays at the root. A trailing `/` is kept.
pub fn normalize(path: &str) -> CompactString {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut out = CompactString::with_capacity(path.len());
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if out.is_empty() || trailing {
        out.push('/');
    }
    out
}

fn split_query(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    }
}

fn is_relative_specifier(path: &str) -> bool {
    path == "." || path == ".." || path.starts_with("./") || path.starts_with("../")
}

fn is_bare_specifier(path: &str) -> bool {
    !path.is_empty() && !path.starts_with('/') && !path.starts_with('.')
}
