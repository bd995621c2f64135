//! Configuration file loading for vize_easel.
//!
//! Reads `easel.config.json` from a directory (the current working
//! directory by default). Only plain data lives here; the collaborators
//! are wired in [`crate::LoaderOptions`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use vize_carton::CompactString;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = "easel.config.json";

/// Plain-data loader settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderConfig {
    /// Template interpolation delimiters (e.g., `["${", "}"]`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiters: Option<(String, String)>,

    /// Template whitespace handling.
    pub whitespace: Whitespace,

    /// Compile templates with development helpers.
    pub dev_mode: bool,

    /// Production build: no dev-only code in scripts, templates or styles.
    pub production: bool,

    /// Extra parser plugins passed to every transform (e.g., `["decorators"]`).
    pub syntax_extensions: Vec<CompactString>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Whitespace {
    #[default]
    Condense,
    Preserve,
}

impl Whitespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Whitespace::Condense => "condense",
            Whitespace::Preserve => "preserve",
        }
    }
}

/// Parse a configuration document.
pub fn parse_config(json: &str) -> Result<LoaderConfig, serde_json::Error> {
    serde_json::from_str(json)
}

/// Load `easel.config.json` from the given directory (or CWD if None).
///
/// A missing file yields the defaults. An unreadable or invalid file is
/// reported with `tracing::warn!` and also yields the defaults.
pub fn load_config(dir: Option<&Path>) -> LoaderConfig {
    let base = dir
        .map(|d| d.to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let config_path = base.join(CONFIG_FILE_NAME);

    if !config_path.exists() {
        return LoaderConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "failed to parse config");
                LoaderConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %config_path.display(), error = %e, "failed to read config");
            LoaderConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"{
                "delimiters": ["${", "}"],
                "whitespace": "preserve",
                "devMode": true,
                "syntaxExtensions": ["decorators"]
            }"#,
        )
        .unwrap();
        assert_eq!(config.delimiters, Some(("${".into(), "}".into())));
        assert_eq!(config.whitespace, Whitespace::Preserve);
        assert!(config.dev_mode);
        assert!(!config.production);
        assert_eq!(config.syntax_extensions, vec!["decorators"]);
    }

    #[test]
    fn test_serialize_defaults() {
        let json = serde_json::to_string(&LoaderConfig::default()).unwrap();
        insta::assert_snapshot!(
            json,
            @r#"{"whitespace":"condense","devMode":false,"production":false,"syntaxExtensions":[]}"#
        );
    }

    #[test]
    fn test_load_config_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{"production": true}"#).unwrap();
        let config = load_config(Some(dir.path()));
        assert!(config.production);
        assert_eq!(config.whitespace, Whitespace::Condense);
    }

    #[test]
    fn test_missing_or_invalid_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(Some(dir.path())), LoaderConfig::default());

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{ nope").unwrap();
        assert_eq!(load_config(Some(dir.path())), LoaderConfig::default());
    }
}
