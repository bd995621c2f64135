//! Error types for vize_easel.

use crate::host::{FetchError, TransformError};
use crate::path::ModuleId;
use crate::sandbox::ExecError;
use std::fmt;
use thiserror::Error;
use vize_carton::CompactString;

/// Result alias used across the loader.
pub type LoadResult<T> = Result<T, LoadError>;

/// Component compilation phase that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Script,
    Template,
    Style,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Script => "script",
            Phase::Template => "template",
            Phase::Style => "style",
        })
    }
}

/// Errors that can occur while loading a module.
///
/// Cloneable: one in-flight load hands the same outcome to every waiter.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// A specifier could not be turned into an identifier
    #[error("Cannot resolve '{specifier}' from {referrer}")]
    Resolution {
        specifier: String,
        referrer: ModuleId,
    },

    /// The resource fetcher failed
    #[error("Failed to fetch {id}: {source}")]
    Fetch { id: ModuleId, source: FetchError },

    /// The component source could not be split into blocks
    #[error("Failed to parse {id}:\n{message}")]
    Parse { id: ModuleId, message: String },

    /// A compiler reported fatal diagnostics
    #[error("Failed to compile {phase} of {id}: {}", .messages.join("; "))]
    Compile {
        id: ModuleId,
        phase: Phase,
        messages: Vec<String>,
    },

    /// The code transformer rejected the source
    #[error("Failed to transform {id}: {error}")]
    Transform { id: ModuleId, error: TransformError },

    /// The module body threw inside the sandbox
    #[error("Failed to execute {id}: {error}")]
    Execution { id: ModuleId, error: ExecError },

    /// The compiled-artifact cache backend failed
    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    /// No handler knows this kind of module
    #[error("Unsupported module type '.{extension}' ({id})")]
    UnsupportedModule {
        id: ModuleId,
        extension: CompactString,
    },

    /// A custom block handler or its callback failed
    #[error("Custom block <{block}> of {id} failed: {message}")]
    CustomBlock {
        id: ModuleId,
        block: String,
        message: String,
    },

    /// The session owning an in-flight load was dropped
    #[error("Session closed while loading {id}")]
    SessionClosed { id: ModuleId },
}

impl LoadError {
    /// Identifier of the module the error is about, when there is one.
    pub fn module_id(&self) -> Option<&ModuleId> {
        match self {
            LoadError::Resolution { referrer, .. } => Some(referrer),
            LoadError::Fetch { id, .. }
            | LoadError::Parse { id, .. }
            | LoadError::Compile { id, .. }
            | LoadError::Transform { id, .. }
            | LoadError::Execution { id, .. }
            | LoadError::UnsupportedModule { id, .. }
            | LoadError::CustomBlock { id, .. }
            | LoadError::SessionClosed { id } => Some(id),
            LoadError::CacheBackend(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_message() {
        let error = LoadError::Compile {
            id: ModuleId::parse("/app.vue"),
            phase: Phase::Script,
            messages: vec!["unexpected token".into(), "missing brace".into()],
        };
        insta::assert_snapshot!(
            error.to_string(),
            @"Failed to compile script of /app.vue: unexpected token; missing brace"
        );
    }

    #[test]
    fn test_fetch_error_keeps_source() {
        let error = LoadError::Fetch {
            id: ModuleId::parse("/missing.js?v=1"),
            source: FetchError::not_found(&ModuleId::parse("/missing.js?v=1")),
        };
        assert_eq!(error.module_id().map(ModuleId::path), Some("/missing.js"));
        assert!(std::error::Error::source(&error).is_some());
        insta::assert_snapshot!(
            error.to_string(),
            @"Failed to fetch /missing.js?v=1: /missing.js?v=1 not found"
        );
    }
}
