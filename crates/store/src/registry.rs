//! Store registry
//!
//! Maps collection names to type-erased stores so that a normalized fetch
//! response can deliver related entities (for example a post's author) to
//! the store that owns them.

use crate::store::EntityStore;
use facet_core::{EntitiesById, Entity, Error, NormalizedEntities, Result};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Entities decoded for one store, not written yet
///
/// Produced by [`ErasedStore::decode_json`]; nothing reaches the store until
/// [`apply`](PendingUpsert::apply) is called.
pub struct PendingUpsert {
    store: String,
    len: usize,
    apply: Box<dyn FnOnce() -> usize + Send>,
}

impl PendingUpsert {
    /// Target store name
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Number of decoded entities
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing was decoded
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Upsert the decoded entities in one commit
    pub fn apply(self) -> usize {
        (self.apply)()
    }
}

impl std::fmt::Debug for PendingUpsert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingUpsert")
            .field("store", &self.store)
            .field("len", &self.len)
            .finish()
    }
}

/// Type-erased view of an [`EntityStore`]
pub trait ErasedStore: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Deserialize entities given as JSON without writing them
    fn decode_json(&self, entities: &EntitiesById) -> Result<PendingUpsert>;

    /// Deserialize and upsert entities given as JSON, in one commit
    fn upsert_json(&self, entities: &EntitiesById) -> Result<usize> {
        Ok(self.decode_json(entities)?.apply())
    }

    /// Number of entities
    fn len(&self) -> usize;

    /// Whether the store holds no entities
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entity
    fn clear(&self) -> usize;
}

impl<E: Entity> ErasedStore for EntityStore<E> {
    fn name(&self) -> &str {
        EntityStore::name(self)
    }

    fn decode_json(&self, entities: &EntitiesById) -> Result<PendingUpsert> {
        let decoded = entities
            .values()
            .map(|value| serde_json::from_value::<E>(value.clone()))
            .collect::<std::result::Result<Vec<E>, _>>()?;
        let store = self.clone();
        Ok(PendingUpsert {
            store: EntityStore::name(self).to_string(),
            len: decoded.len(),
            apply: Box::new(move || store.upsert_many(decoded)),
        })
    }

    fn len(&self) -> usize {
        EntityStore::len(self)
    }

    fn clear(&self) -> usize {
        EntityStore::clear(self)
    }
}

/// Named collection of stores
///
/// ## Example
///
/// ```rust,ignore
/// let registry = StoreRegistry::new()
///     .register(users.clone())?
///     .register(posts.clone())?;
///
/// registry.upsert_normalized(&response.entities, None)?;
/// ```
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: IndexMap<String, Arc<dyn ErasedStore>>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StoreRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a store under its own name
    ///
    /// Fails if a store with the same name is already registered.
    pub fn register<S: ErasedStore + 'static>(mut self, store: S) -> Result<Self> {
        let name = store.name().to_string();
        if self.stores.contains_key(&name) {
            return Err(Error::invalid_config(format!(
                "store '{}' registered twice",
                name
            )));
        }
        debug!(target: "facet::store", store = %name, "Store registered");
        self.stores.insert(name, Arc::new(store));
        Ok(self)
    }

    /// Store by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn ErasedStore>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| Error::StoreNotRegistered(name.to_string()))
    }

    /// Whether a store is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Registered names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// Decode every registered collection of a normalized payload
    ///
    /// Collections without a registered store are skipped, as is `skip`
    /// (used by a paginator for its own collection, which it writes itself).
    /// Fails on the first collection that does not decode; nothing is
    /// written either way.
    pub fn decode_normalized(
        &self,
        entities: &NormalizedEntities,
        skip: Option<&str>,
    ) -> Result<Vec<PendingUpsert>> {
        let mut pending = Vec::new();
        for (name, by_id) in entities {
            if skip == Some(name.as_str()) {
                continue;
            }
            match self.stores.get(name) {
                Some(store) => pending.push(store.decode_json(by_id)?),
                None => {
                    trace!(target: "facet::store", collection = %name, "No store for collection, skipping");
                }
            }
        }
        Ok(pending)
    }

    /// Upsert every collection of a normalized payload into its store
    ///
    /// All collections are decoded before any store is written, so a payload
    /// that fails to decode changes nothing. Returns the number of entities
    /// written.
    pub fn upsert_normalized(
        &self,
        entities: &NormalizedEntities,
        skip: Option<&str>,
    ) -> Result<usize> {
        let pending = self.decode_normalized(entities, skip)?;
        Ok(pending.into_iter().map(PendingUpsert::apply).sum())
    }
}
