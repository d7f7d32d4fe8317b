//! Error types for facet
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Lookups that find nothing are not errors: they return `None`. Errors are
//! reserved for misconfiguration and for failures reported by a caller-supplied
//! fetch function.

use std::fmt;
use thiserror::Error;

/// Result type alias for facet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for facet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An index was requested that the store never declared
    #[error("Store '{store}' has no index named '{index}'")]
    IndexNotDeclared {
        /// Name of the entity store
        store: String,
        /// Name of the requested index
        index: String,
    },

    /// The same index name was declared twice on one store
    #[error("Store '{store}' declares index '{index}' more than once")]
    DuplicateIndex {
        /// Name of the entity store
        store: String,
        /// Name of the duplicated index
        index: String,
    },

    /// A collection name was looked up in a registry that does not hold it
    #[error("Store not registered: {0}")]
    StoreNotRegistered(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller-supplied fetch function failed
    #[error("Fetch failed: {0}")]
    Fetch(String),
}

impl Error {
    /// Build a fetch error from anything printable
    pub fn fetch(reason: impl fmt::Display) -> Self {
        Error::Fetch(reason.to_string())
    }

    /// Build a configuration error from anything printable
    pub fn invalid_config(reason: impl fmt::Display) -> Self {
        Error::InvalidConfig(reason.to_string())
    }

    /// Whether this error was raised by a fetch function
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
