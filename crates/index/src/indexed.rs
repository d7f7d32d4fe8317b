//! Entity store with several declared secondary indexes
//!
//! ## Example
//!
//! ```rust,ignore
//! let users = IndexedStore::builder(EntityStore::<User>::new("users"))
//!     .index("email", |u: &User| Some(u.email.clone()))
//!     .index("handle", |u: &User| u.handle.clone())
//!     .build()?;
//!
//! let by_email = users.index_query("email")?;
//! let ada = by_email.get_entity("ada@example.com");
//! ```

use crate::index_store::{IndexDefinition, IndexStore};
use crate::query::IndexQuery;
use facet_core::{Entity, Error, Result};
use facet_store::EntityStore;
use futures::stream::BoxStream;
use indexmap::IndexMap;
use tracing::debug;

/// Builder declaring the indexes of an [`IndexedStore`]
pub struct IndexedStoreBuilder<E: Entity> {
    store: EntityStore<E>,
    definitions: Vec<IndexDefinition<E>>,
}

impl<E: Entity> IndexedStoreBuilder<E> {
    /// Declare an index from a name and a key extractor
    pub fn index<F>(self, name: impl Into<String>, extract: F) -> Self
    where
        F: Fn(&E) -> Option<String> + Send + Sync + 'static,
    {
        self.definition(IndexDefinition::new(name, extract))
    }

    /// Declare an index from a prepared definition
    pub fn definition(mut self, definition: IndexDefinition<E>) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Attach every declared index
    ///
    /// Fails with [`Error::DuplicateIndex`] if a name is declared twice; no
    /// index is attached in that case.
    pub fn build(self) -> Result<IndexedStore<E>> {
        let mut seen = std::collections::HashSet::new();
        for definition in &self.definitions {
            if !seen.insert(definition.name()) {
                return Err(Error::DuplicateIndex {
                    store: self.store.name().to_string(),
                    index: definition.name().to_string(),
                });
            }
        }

        let indexes: IndexMap<String, IndexStore<E>> = self
            .definitions
            .into_iter()
            .map(|definition| {
                (
                    definition.name().to_string(),
                    IndexStore::new(&self.store, definition),
                )
            })
            .collect();

        debug!(
            target: "facet::index",
            store = %self.store.name(),
            indexes = indexes.len(),
            "Indexed store built"
        );

        Ok(IndexedStore {
            store: self.store,
            indexes,
        })
    }
}

/// Entity store plus named secondary indexes
pub struct IndexedStore<E: Entity> {
    store: EntityStore<E>,
    indexes: IndexMap<String, IndexStore<E>>,
}

impl<E: Entity> Clone for IndexedStore<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            indexes: self.indexes.clone(),
        }
    }
}

impl<E: Entity> std::fmt::Debug for IndexedStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedStore")
            .field("store", &self.store.name())
            .field("indexes", &self.indexes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<E: Entity> IndexedStore<E> {
    /// Start declaring indexes over `store`
    pub fn builder(store: EntityStore<E>) -> IndexedStoreBuilder<E> {
        IndexedStoreBuilder {
            store,
            definitions: Vec::new(),
        }
    }

    /// Underlying entity store
    pub fn store(&self) -> &EntityStore<E> {
        &self.store
    }

    /// Declared index names, in declaration order
    pub fn indexes(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// Index store by name
    pub fn index_store(&self, name: &str) -> Result<&IndexStore<E>> {
        self.indexes.get(name).ok_or_else(|| Error::IndexNotDeclared {
            store: self.store.name().to_string(),
            index: name.to_string(),
        })
    }

    /// Query over the index `name`
    pub fn index_query(&self, name: &str) -> Result<IndexQuery<E>> {
        self.index_store(name).cloned().map(IndexQuery::new)
    }

    /// Live entity stored under `key` in index `name`
    pub fn select_entity_by(
        &self,
        name: &str,
        key: impl Into<String>,
    ) -> Result<BoxStream<'static, Option<E>>> {
        Ok(self.index_query(name)?.select_entity(key))
    }

    /// Detach every index from the store
    pub fn destroy(&self) {
        for index in self.indexes.values() {
            index.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_core::EntityId;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: i64,
        email: String,
        handle: Option<String>,
    }

    impl Entity for User {
        fn id(&self) -> EntityId {
            EntityId::Int(self.id)
        }
    }

    fn users() -> IndexedStore<User> {
        IndexedStore::builder(EntityStore::new("users"))
            .index("email", |u: &User| Some(u.email.clone()))
            .index("handle", |u: &User| u.handle.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn test_indexes_listed_in_order() {
        let users = users();
        assert_eq!(users.indexes().collect::<Vec<_>>(), vec!["email", "handle"]);
        assert_eq!(users.index_store("handle").unwrap().name(), "IDX/users/handle");
    }

    #[test]
    fn test_undeclared_index_fails_fast() {
        let users = users();
        let err = users.index_query("phone").unwrap_err();
        assert_eq!(
            err,
            Error::IndexNotDeclared {
                store: "users".into(),
                index: "phone".into()
            }
        );
        assert!(users.select_entity_by("phone", "x").is_err());
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let store = EntityStore::<User>::new("users");
        let result = IndexedStore::builder(store.clone())
            .index("email", |u: &User| Some(u.email.clone()))
            .index("email", |u: &User| Some(u.email.to_lowercase()))
            .build();
        assert!(matches!(result, Err(Error::DuplicateIndex { .. })));
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_each_index_follows_store() {
        let users = users();
        users.store().upsert(User {
            id: 1,
            email: "a@x".into(),
            handle: Some("ada".into()),
        });

        let by_email = users.index_query("email").unwrap();
        let by_handle = users.index_query("handle").unwrap();
        assert_eq!(by_email.get_id("a@x"), Some(EntityId::from(1i64)));
        assert_eq!(by_handle.get_id("ada"), Some(EntityId::from(1i64)));
    }

    #[test]
    fn test_destroy_detaches_all() {
        let users = users();
        assert_eq!(users.store().listener_count(), 2);
        users.destroy();
        assert_eq!(users.store().listener_count(), 0);
    }
}
