//! Paginator configuration
//!
//! The serializable part of the configuration can live in a TOML file:
//!
//! ```toml
//! name = "posts"
//! pages_controls = true
//! range = false
//! start_with = 1
//! clear_store_with_cache = true
//! placeholders = true
//! debounce_ms = 0
//! throttle_ms = 1000
//! ```
//!
//! The cache-timeout signal and the entity-not-found callback are not data;
//! they are attached through [`PaginatorBuilder`](crate::PaginatorBuilder).

use facet_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Minimum spacing between two fetch calls, in milliseconds
pub const DEFAULT_THROTTLE_MS: u64 = 1000;

/// Serializable paginator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginatorConfig {
    /// Partition name inside the host store; generated when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Attach the full page list to every rendered page
    pub pages_controls: bool,
    /// Attach `from`/`to` item indexes to every rendered page
    pub range: bool,
    /// Page the paginator starts on
    pub start_with: u32,
    /// Clear the entity store together with the page cache
    pub clear_store_with_cache: bool,
    /// Render unresolved identities as placeholders instead of dropping them
    pub placeholders: bool,
    /// Idle window collapsing bursts of page changes
    pub debounce_ms: u64,
    /// Minimum spacing between fetch calls
    pub throttle_ms: u64,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            name: None,
            pages_controls: false,
            range: false,
            start_with: 1,
            clear_store_with_cache: true,
            placeholders: true,
            debounce_ms: 0,
            throttle_ms: DEFAULT_THROTTLE_MS,
        }
    }
}

impl PaginatorConfig {
    /// Config with a fixed name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PaginatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Reject values no paginator can run with
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::invalid_config("paginator name must not be empty"));
            }
        }
        if self.start_with == 0 {
            return Err(Error::invalid_config("start_with is 1-based, got 0"));
        }
        Ok(())
    }

    /// Debounce window
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Throttle window
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}
