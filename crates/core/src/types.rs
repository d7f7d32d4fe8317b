//! Core types for facet
//!
//! This module defines the foundational types:
//! - EntityId: Opaque identity of an entity inside one collection
//! - Entity: Trait every stored value implements

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an entity within one collection
///
/// Identities are owned by the collection that stores the entity; nothing in
/// facet mints them. Numbers and strings are both accepted so that payloads
/// coming from JSON backends round-trip unchanged.
///
/// Ordering is total: every `Int` sorts before every `Str`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Numeric identity
    Int(i64),
    /// String identity
    Str(String),
}

impl EntityId {
    /// Key used for this identity inside JSON objects (always a string)
    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{}", n),
            EntityId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Int(n)
    }
}

impl From<i32> for EntityId {
    fn from(n: i32) -> Self {
        EntityId::Int(i64::from(n))
    }
}

impl From<u32> for EntityId {
    fn from(n: u32) -> Self {
        EntityId::Int(i64::from(n))
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Str(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId::Str(s)
    }
}

/// A value stored in an entity collection
///
/// Entities are plain data: cloned out of snapshots, compared to suppress
/// duplicate emissions, and (de)serialized when they arrive inside normalized
/// fetch responses.
///
/// # Example
///
/// ```
/// use facet_core::{Entity, EntityId};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct User {
///     id: i64,
///     email: String,
/// }
///
/// impl Entity for User {
///     fn id(&self) -> EntityId {
///         EntityId::Int(self.id)
///     }
/// }
/// ```
pub trait Entity: Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Identity of this entity
    fn id(&self) -> EntityId;
}
