//! Index store: one secondary index kept in sync with an entity store
//!
//! The index registers a synchronous listener on its entity store. Every
//! committed change batch is folded into a new [`IndexState`] inside the
//! commit, so the index is already current when the store publishes the
//! snapshot that caused it.

use crate::state::IndexState;
use facet_core::{Entity, EntityId};
use facet_store::{select_distinct, ChangeSubscription, EntityStore};
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

type Extractor<E> = Arc<dyn Fn(&E) -> Option<String> + Send + Sync>;

/// Name and key extractor of one index
pub struct IndexDefinition<E> {
    name: String,
    extract: Extractor<E>,
}

impl<E> Clone for IndexDefinition<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<E> std::fmt::Debug for IndexDefinition<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDefinition")
            .field("name", &self.name)
            .finish()
    }
}

impl<E> IndexDefinition<E> {
    /// Declare an index; `extract` returns `None` for entities without a key
    pub fn new<F>(name: impl Into<String>, extract: F) -> Self
    where
        F: Fn(&E) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            extract: Arc::new(extract),
        }
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of an entity; empty keys count as absent
    pub fn key_of(&self, entity: &E) -> Option<String> {
        (self.extract)(entity).filter(|key| !key.is_empty())
    }
}

struct Shared {
    name: String,
    state: watch::Sender<Arc<IndexState>>,
}

/// Live secondary index over an [`EntityStore`]
///
/// Cheap to clone; clones share the same index. The index stops following
/// the store after [`destroy`](Self::destroy) or when the last clone drops.
pub struct IndexStore<E: Entity> {
    store: EntityStore<E>,
    definition: IndexDefinition<E>,
    shared: Arc<Shared>,
    subscription: Arc<Mutex<Option<ChangeSubscription>>>,
}

impl<E: Entity> Clone for IndexStore<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            definition: self.definition.clone(),
            shared: Arc::clone(&self.shared),
            subscription: Arc::clone(&self.subscription),
        }
    }
}

impl<E: Entity> std::fmt::Debug for IndexStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("name", &self.shared.name)
            .field("entries", &self.shared.state.borrow().len())
            .finish()
    }
}

impl<E: Entity> IndexStore<E> {
    /// Attach an index to a store, seeding it from the store's entities
    pub fn new(store: &EntityStore<E>, definition: IndexDefinition<E>) -> Self {
        let name = format!("IDX/{}/{}", store.name(), definition.name());
        let (state, _) = watch::channel(Arc::new(IndexState::default()));
        let shared = Arc::new(Shared { name, state });

        let seed_shared = Arc::clone(&shared);
        let seed_definition = definition.clone();
        let listen_shared = Arc::clone(&shared);
        let listen_definition = definition.clone();

        let subscription = store.listen_from(
            move |snapshot| {
                let seeded = IndexState::seed(snapshot, |e| seed_definition.key_of(e));
                debug!(
                    target: "facet::index",
                    index = %seed_shared.name,
                    entries = seeded.len(),
                    "Index seeded"
                );
                seed_shared.state.send_replace(Arc::new(seeded));
            },
            move |snapshot, batch| {
                let current = Arc::clone(&listen_shared.state.borrow());
                let next = current.apply(batch, |id| {
                    snapshot.get(id).and_then(|e| listen_definition.key_of(e))
                });
                debug!(
                    target: "facet::index",
                    index = %listen_shared.name,
                    version = batch.version,
                    before = current.len(),
                    after = next.len(),
                    "Update Indexes"
                );
                listen_shared.state.send_replace(Arc::new(next));
            },
        );

        Self {
            store: store.clone(),
            definition,
            shared,
            subscription: Arc::new(Mutex::new(Some(subscription))),
        }
    }

    /// Full index name, `IDX/<store>/<index>`
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Index definition
    pub fn definition(&self) -> &IndexDefinition<E> {
        &self.definition
    }

    /// Indexed entity store
    pub fn store(&self) -> &EntityStore<E> {
        &self.store
    }

    /// Current index state
    pub fn snapshot(&self) -> Arc<IndexState> {
        Arc::clone(&self.shared.state.borrow())
    }

    /// Raw watch receiver over index states
    pub fn watch(&self) -> watch::Receiver<Arc<IndexState>> {
        self.shared.state.subscribe()
    }

    /// Identity holding `key`
    pub fn resolve(&self, key: &str) -> Option<EntityId> {
        self.shared.state.borrow().resolve(key).cloned()
    }

    /// Key held by `id`
    pub fn resolve_index_key(&self, id: &EntityId) -> Option<String> {
        self.shared.state.borrow().index_key(id).map(str::to_string)
    }

    /// Live identity for `key`
    ///
    /// The current value (possibly `None`) is emitted immediately; later
    /// values only when the identity changes.
    pub fn subscribe_resolved(&self, key: impl Into<String>) -> BoxStream<'static, Option<EntityId>> {
        let key = key.into();
        select_distinct(self.watch(), move |state| state.resolve(&key).cloned())
    }

    /// Live key for `id`
    pub fn subscribe_index_key(&self, id: EntityId) -> BoxStream<'static, Option<String>> {
        select_distinct(self.watch(), move |state| {
            state.index_key(&id).map(str::to_string)
        })
    }

    /// Whether the index still follows its store
    pub fn is_active(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Stop following the store
    ///
    /// The last state stays readable. Live streams end once every clone of
    /// the index has been dropped.
    pub fn destroy(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
            debug!(target: "facet::index", index = %self.shared.name, "Index destroyed");
        }
    }
}
