//! Index queries: key -> identity -> entity

use crate::index_store::IndexStore;
use crate::state::IndexState;
use facet_core::{Entity, EntityId};
use facet_store::{EntityStore, StoreState};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;

/// Lookups of entities by index key
///
/// Obtained from [`IndexedStore::index_query`](crate::IndexedStore::index_query).
pub struct IndexQuery<E: Entity> {
    index: IndexStore<E>,
}

impl<E: Entity> Clone for IndexQuery<E> {
    fn clone(&self) -> Self {
        Self {
            index: self.index.clone(),
        }
    }
}

impl<E: Entity> std::fmt::Debug for IndexQuery<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexQuery")
            .field("index", &self.index.name())
            .finish()
    }
}

impl<E: Entity> IndexQuery<E> {
    /// Query over an index store
    pub fn new(index: IndexStore<E>) -> Self {
        Self { index }
    }

    fn store(&self) -> &EntityStore<E> {
        self.index.store()
    }

    /// Identity holding `key`
    pub fn get_id(&self, key: &str) -> Option<EntityId> {
        self.index.resolve(key)
    }

    /// Key held by `id`
    pub fn get_index_key(&self, id: &EntityId) -> Option<String> {
        self.index.resolve_index_key(id)
    }

    /// Whether an entity is stored under `key`
    pub fn has_entity(&self, key: &str) -> bool {
        self.get_id(key)
            .map(|id| self.store().has(&id))
            .unwrap_or(false)
    }

    /// Entity stored under `key`
    pub fn get_entity(&self, key: &str) -> Option<E> {
        self.get_id(key).and_then(|id| self.store().get(&id))
    }

    /// Live identity for `key`
    pub fn select_id(&self, key: impl Into<String>) -> BoxStream<'static, Option<EntityId>> {
        self.index.subscribe_resolved(key)
    }

    /// Live key for `id`
    pub fn select_index_key(&self, id: EntityId) -> BoxStream<'static, Option<String>> {
        self.index.subscribe_index_key(id)
    }

    /// Live entity stored under `key`
    ///
    /// Follows both the index and the store: when `key` moves to another
    /// identity, the previous identity's entity is never emitted again. Values
    /// are only computed from an index state that is not ahead of the store
    /// snapshot, so an entity is never paired with a stale key.
    pub fn select_entity(&self, key: impl Into<String>) -> BoxStream<'static, Option<E>> {
        let follow = Follow {
            key: key.into(),
            index: self.index.watch(),
            store: self.store().watch(),
            last: None,
            primed: false,
        };

        stream::unfold(follow, |mut follow| async move {
            loop {
                if follow.primed && !follow.changed().await {
                    return None;
                }
                follow.primed = true;

                let index: Arc<IndexState> = Arc::clone(&follow.index.borrow_and_update());
                let store: Arc<StoreState<E>> = Arc::clone(&follow.store.borrow_and_update());
                if store.version() < index.version() {
                    continue;
                }

                let value = index
                    .resolve(&follow.key)
                    .and_then(|id| store.get(id).cloned());
                if follow.last.as_ref() != Some(&value) {
                    follow.last = Some(value.clone());
                    return Some((value, follow));
                }
            }
        })
        .boxed()
    }
}

struct Follow<E> {
    key: String,
    index: watch::Receiver<Arc<IndexState>>,
    store: watch::Receiver<Arc<StoreState<E>>>,
    last: Option<Option<E>>,
    primed: bool,
}

impl<E> Follow<E> {
    /// Wait for either side to change; `false` once either side is gone
    async fn changed(&mut self) -> bool {
        tokio::select! {
            r = self.index.changed() => r.is_ok(),
            r = self.store.changed() => r.is_ok(),
        }
    }
}
