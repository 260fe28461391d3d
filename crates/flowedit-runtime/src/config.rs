#![forbid(unsafe_code)]

//! Editor configuration.
//!
//! [`EditorConfig`] groups every tunable of the runtime and can be loaded
//! from JSON, or from TOML with the `config-file` feature.
//!
//! ```toml
//! # flowedit.toml
//! [history]
//! debounce_ms = 300
//! max_depth = 500
//!
//! [storage]
//! database_path = "data/flowedit.redb"
//! fallback_dir = "data/local"
//! ```
//!
//! Every field has a default matching the built-in behaviour, so
//! `EditorConfig::default()` is a complete configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::history::HistoryConfig;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub history: HistoryConfig,
    pub storage: StorageConfig,
}

/// Where persisted data lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// redb database file holding the current state and drafts.
    pub database_path: PathBuf,
    /// Directory for the fallback text copy.
    pub fallback_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("flowedit.redb"),
            fallback_dir: PathBuf::from("flowedit-local"),
        }
    }
}

impl StorageConfig {
    /// Put both the database and the fallback directory under `root`.
    #[must_use]
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let defaults = Self::default();
        Self {
            database_path: root.join(defaults.database_path),
            fallback_dir: root.join(defaults.fallback_dir),
        }
    }
}

impl EditorConfig {
    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a TOML string.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Check parameter ranges. An empty list means the config is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.history.max_depth == 0 {
            errors.push("history.max_depth must be at least 1".to_owned());
        }
        if self.storage.database_path.as_os_str().is_empty() {
            errors.push("storage.database_path must not be empty".to_owned());
        }
        if self.storage.fallback_dir.as_os_str().is_empty() {
            errors.push("storage.fallback_dir must not be empty".to_owned());
        }
        errors
    }

    /// [`validate`](Self::validate) as a `Result`.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur when loading a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config-file")]
    Toml(toml::de::Error),
    /// JSON parse error.
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "config-file")]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "config-file")]
            Self::Toml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_match_built_in_behaviour() {
        let config = EditorConfig::default();
        assert_eq!(config.history.debounce(), Duration::from_millis(300));
        assert_eq!(config.history.max_depth, usize::MAX);
        assert_eq!(config.storage.database_path, PathBuf::from("flowedit.redb"));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EditorConfig::from_json_str(r#"{"history": {"debounce_ms": 120}}"#).unwrap();
        assert_eq!(config.history.debounce_ms, 120);
        assert_eq!(config.history.max_depth, usize::MAX);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn bad_json_is_an_error() {
        let err = EditorConfig::from_json_str("{").unwrap_err();
        assert!(err.to_string().starts_with("JSON parse error"));
    }

    #[test]
    fn zero_depth_fails_validation() {
        let mut config = EditorConfig::default();
        config.history.max_depth = 0;
        assert!(matches!(
            config.validated(),
            Err(ConfigError::Validation(errors)) if errors.len() == 1
        ));
    }

    #[test]
    fn storage_under_root() {
        let storage = StorageConfig::under("/tmp/x");
        assert_eq!(storage.database_path, PathBuf::from("/tmp/x/flowedit.redb"));
        assert_eq!(storage.fallback_dir, PathBuf::from("/tmp/x/flowedit-local"));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_round_trip() {
        let config = EditorConfig::from_toml_str(
            "[history]\ndebounce_ms = 50\nmax_depth = 10\n\n[storage]\nfallback_dir = \"local\"\n",
        )
        .unwrap();
        assert_eq!(config.history.debounce_ms, 50);
        assert_eq!(config.history.max_depth, 10);
        assert_eq!(config.storage.fallback_dir, PathBuf::from("local"));
        assert_eq!(config.storage.database_path, PathBuf::from("flowedit.redb"));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EditorConfig::from_toml_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
