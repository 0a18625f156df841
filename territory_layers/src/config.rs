// Copyright 2025 the Territory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine configuration, loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! [spatial]
//! adjacency_epsilon = 1e-7
//! backend = "rtree"        # or "flat_vec"
//! code_keys = ["code", "plz", "postcode"]
//!
//! [history]
//! undo_depth = 50
//!
//! [autosave]
//! debounce_ms = 2000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use territory_spatial::SpatialConfig;
use thiserror::Error;

/// Undo history settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum undo entries kept per area; older entries are evicted.
    pub undo_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { undo_depth: 50 }
    }
}

/// Autosave settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit of a layer before its write is sent.
    pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { debounce_ms: 2_000 }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dataset ingestion and spatial index.
    pub spatial: SpatialConfig,
    /// Undo history.
    pub history: HistoryConfig,
    /// Autosave.
    pub autosave: AutosaveConfig,
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid TOML for [`EngineConfig`].
    #[error("invalid configuration")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let eps = self.spatial.adjacency_epsilon;
        if !eps.is_finite() || eps < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "spatial.adjacency_epsilon must be finite and non-negative, got {eps}"
            )));
        }
        if self.spatial.code_keys.is_empty() {
            return Err(ConfigError::Invalid("spatial.code_keys must not be empty".into()));
        }
        if self.history.undo_depth == 0 {
            return Err(ConfigError::Invalid("history.undo_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use territory_spatial::SpatialIndexBackend;

    #[test]
    fn empty_document_is_default() {
        let c = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(c, EngineConfig::default());
        assert_eq!(c.history.undo_depth, 50);
        assert_eq!(c.autosave.debounce_ms, 2_000);
        assert_eq!(c.spatial.backend, SpatialIndexBackend::RTree);
    }

    #[test]
    fn partial_document_overrides() {
        let c = EngineConfig::from_toml_str(
            r#"
            [spatial]
            backend = "flat_vec"

            [autosave]
            debounce_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(c.spatial.backend, SpatialIndexBackend::FlatVec);
        assert_eq!(c.spatial.adjacency_epsilon, 1e-7);
        assert_eq!(c.autosave.debounce_ms, 500);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("[history]\nundo_depth = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[spatial]\nadjacency_epsilon = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[history]\nundo_depth = \"many\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_path("/definitely/not/here.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
