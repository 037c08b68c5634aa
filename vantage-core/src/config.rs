//! Configuration types

use crate::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cache layer configuration.
///
/// Loaded from environment variables or a TOML file, with defaults for
/// anything not specified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of names sent in one batched resolve call.
    pub batch_get_limit: usize,
    /// Page size used when walking a list to completion.
    pub list_page_size: i32,
    /// Whether composition fetches suppress user-visible notifications.
    pub silent_composition: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            batch_get_limit: 100,
            list_page_size: 1000,
            silent_composition: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batched resolve limit.
    pub fn with_batch_get_limit(mut self, limit: usize) -> Self {
        self.batch_get_limit = limit;
        self
    }

    /// Set the list page size.
    pub fn with_list_page_size(mut self, page_size: i32) -> Self {
        self.list_page_size = page_size;
        self
    }

    /// Enable or disable silent composition fetches.
    pub fn with_silent_composition(mut self, silent: bool) -> Self {
        self.silent_composition = silent;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `VANTAGE_CACHE_BATCH_GET_LIMIT`: Names per batched resolve (default: 100)
    /// - `VANTAGE_CACHE_LIST_PAGE_SIZE`: Page size for list walks (default: 1000)
    /// - `VANTAGE_CACHE_SILENT_COMPOSITION`: "true" or "false" (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            batch_get_limit: std::env::var("VANTAGE_CACHE_BATCH_GET_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_get_limit),
            list_page_size: std::env::var("VANTAGE_CACHE_LIST_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.list_page_size),
            silent_composition: std::env::var("VANTAGE_CACHE_SILENT_COMPOSITION")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.silent_composition),
        }
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(contents: &str) -> VantageResult<Self> {
        let config: CacheConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn from_path(path: &Path) -> VantageResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - batch_get_limit > 0
    /// - list_page_size > 0
    pub fn validate(&self) -> VantageResult<()> {
        if self.batch_get_limit == 0 {
            return Err(VantageError::Config(ConfigError::InvalidValue {
                field: "batch_get_limit".to_string(),
                value: self.batch_get_limit.to_string(),
                reason: "batch_get_limit must be greater than 0".to_string(),
            }));
        }

        if self.list_page_size <= 0 {
            return Err(VantageError::Config(ConfigError::InvalidValue {
                field: "list_page_size".to_string(),
                value: self.list_page_size.to_string(),
                reason: "list_page_size must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}
