//! Configuration for store selection and engine behaviour
//!
//! [`StoreConfig`] picks and parameterizes a store adapter; it is usually
//! built from a URI given on the command line. [`EngineConfig`] tunes the
//! engine itself and can be loaded from a JSON file.

use crate::store::Isolation;
use crate::{FolioError, Result};
use folio_retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Template stored on the first save of an empty README
pub const DEFAULT_README_TEMPLATE: &str = "# Project Name

## Current Focus
- [ ] Current milestone
- [ ] Active tasks
- [ ] Next steps

## Progress Log
### YYYY-MM-DD
- Work completed:
- Next steps:
- Notes:

## Overview
[What the project is and who it is for]

## Setup & Usage
[How to build and run it]
";

/// Enumeration of supported store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process tables, lost on exit
    Memory,
    /// Single JSON document on the local filesystem
    File,
}

/// Configuration structure for store backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// The store backend to use
    pub backend: StoreBackend,
    /// Database file (required for the file backend)
    pub file_path: Option<PathBuf>,
    /// Gzip the database file on write
    #[serde(default)]
    pub compress: bool,
    /// Isolation for the memory backend
    #[serde(default)]
    pub isolation: Isolation,
}

impl StoreConfig {
    pub fn memory() -> Self {
        StoreConfig {
            backend: StoreBackend::Memory,
            file_path: None,
            compress: false,
            isolation: Isolation::default(),
        }
    }

    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        StoreConfig {
            backend: StoreBackend::File,
            file_path: Some(path.into()),
            compress: false,
            isolation: Isolation::default(),
        }
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Parse a store URI
    ///
    /// Supports formats:
    /// - `memory://` or `memory://serializable` for the in-process store
    /// - `file://path/to/folio.json` for the file store
    /// - a bare path, treated as a file store
    ///
    /// File paths ending in `.gz` enable compression.
    pub fn from_uri(uri: &str) -> Result<StoreConfig> {
        if let Some(mode) = uri.strip_prefix("memory://") {
            let isolation = if mode.is_empty() {
                Isolation::default()
            } else {
                mode.parse()?
            };
            return Ok(StoreConfig::memory().with_isolation(isolation));
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        if path.is_empty() {
            return Err(FolioError::validation("Invalid store URI: missing file path"));
        }
        if let Some((scheme, _)) = uri.split_once("://") {
            if scheme != "file" {
                return Err(FolioError::validation(format!(
                    "Unsupported store scheme '{scheme}' (expected memory:// or file://)"
                )));
            }
        }

        let compress = path.ends_with(".gz");
        Ok(StoreConfig::file(path).with_compression(compress))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            StoreBackend::File => {
                let missing = self
                    .file_path
                    .as_ref()
                    .map_or(true, |path| path.as_os_str().is_empty());
                if missing {
                    return Err(FolioError::validation(
                        "File backend requires a database path",
                    ));
                }
            }
            StoreBackend::Memory => {
                if self.compress {
                    return Err(FolioError::validation(
                        "Compression only applies to the file backend",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::file("folio.json")
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How often a transaction that hit a version conflict is re-run
    pub conflict_retries: u32,
    /// First backoff delay between conflict retries
    pub retry_initial_interval_ms: u64,
    /// Upper bound for the backoff delay
    pub retry_max_interval_ms: u64,
    /// Status given to projects created without one
    pub default_status: String,
    /// Content stored when a README is first saved empty
    pub readme_template: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 1,
            retry_initial_interval_ms: 10,
            retry_max_interval_ms: 250,
            default_status: crate::model::DEFAULT_PROJECT_STATUS.to_string(),
            readme_template: DEFAULT_README_TEMPLATE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FolioError::storage(format!(
                "Failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_status.trim().is_empty() {
            return Err(FolioError::validation("default_status must not be empty"));
        }
        if self.retry_initial_interval_ms > self.retry_max_interval_ms {
            return Err(FolioError::validation(
                "retry_initial_interval_ms must not exceed retry_max_interval_ms",
            ));
        }
        Ok(())
    }

    /// Backoff policy for re-running conflicted transactions
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.conflict_retries)
            .with_initial_interval(Duration::from_millis(self.retry_initial_interval_ms))
            .with_max_interval(Duration::from_millis(self.retry_max_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_store_config() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, StoreBackend::File);
        assert_eq!(config.file_path, Some(PathBuf::from("folio.json")));
        assert!(!config.compress);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_uri_memory() {
        let config = StoreConfig::from_uri("memory://").unwrap();
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.isolation, Isolation::Optimistic);

        let config = StoreConfig::from_uri("memory://serializable").unwrap();
        assert_eq!(config.isolation, Isolation::Serializable);
    }

    #[test]
    fn test_from_uri_file() {
        let config = StoreConfig::from_uri("file://data/folio.json").unwrap();
        assert_eq!(config.backend, StoreBackend::File);
        assert_eq!(config.file_path, Some(PathBuf::from("data/folio.json")));
        assert!(!config.compress);

        let config = StoreConfig::from_uri("/var/lib/folio.json.gz").unwrap();
        assert!(config.compress);
    }

    #[test]
    fn test_from_uri_rejects_bad_input() {
        assert!(StoreConfig::from_uri("file://")
            .unwrap_err()
            .to_string()
            .contains("missing file path"));
        assert!(StoreConfig::from_uri("s3://bucket/key").is_err());
        assert!(StoreConfig::from_uri("memory://eventual").is_err());
    }

    #[test]
    fn test_validate_store_config() {
        let mut config = StoreConfig::file("folio.json");
        config.file_path = None;
        assert!(config.validate().is_err());

        let config = StoreConfig::memory().with_compression(true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_config_from_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"conflict_retries": 3, "default_status": "planning"}}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.conflict_retries, 3);
        assert_eq!(config.default_status, "planning");
        assert_eq!(config.retry_initial_interval_ms, 10);
        assert_eq!(config.readme_template, DEFAULT_README_TEMPLATE);
        assert_eq!(config.retry_policy().max_retries(), 3);
    }

    #[test]
    fn test_engine_config_validation() {
        let config = EngineConfig {
            default_status: "  ".into(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            retry_initial_interval_ms: 500,
            retry_max_interval_ms: 100,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
