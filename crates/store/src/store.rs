//! EntityStore: ordered, identity-keyed entity collection
//!
//! ## Design Principles
//!
//! 1. **Snapshots**: readers get an `Arc<StoreState>`; it never changes under them.
//! 2. **One commit, one batch**: every transaction publishes at most one snapshot
//!    and one `ChangeBatch`, so derived state never sees half a transaction.
//! 3. **Ordered delivery**: synchronous listeners run inside the commit, in
//!    commit order, before the next transaction may start and before the new
//!    snapshot is published.
//!
//! ## Listener Rules
//!
//! Listeners registered with [`EntityStore::listen`] run while the store's
//! commit lock is held. They may read the snapshot they are given and write to
//! their own state, but they must not open a transaction on the same store.
//!
//! ## Partitions
//!
//! Besides entities, the state container holds named `PaginatorState`
//! partitions. Writing a partition publishes a new snapshot but no change batch.

use crate::change::ChangeBatch;
use crate::observe::select_distinct;
use crate::transaction::StoreTransaction;
use facet_core::{Entity, EntityId, PaginatorState, Result};
use futures::stream::BoxStream;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

/// Default capacity of the broadcast channel carrying change batches
const DEFAULT_CHANGE_BUFFER: usize = 256;

// ============================================================================
// StoreState
// ============================================================================

/// Immutable snapshot of a store
#[derive(Debug, Clone)]
pub struct StoreState<E> {
    pub(crate) entities: IndexMap<EntityId, E>,
    pub(crate) partitions: BTreeMap<String, PaginatorState>,
    pub(crate) version: u64,
}

impl<E> Default for StoreState<E> {
    fn default() -> Self {
        Self {
            entities: IndexMap::new(),
            partitions: BTreeMap::new(),
            version: 0,
        }
    }
}

impl<E> StoreState<E> {
    /// Entity by identity
    pub fn get(&self, id: &EntityId) -> Option<&E> {
        self.entities.get(id)
    }

    /// Whether the identity is present
    pub fn has(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Entities in insertion order
    pub fn entities(&self) -> &IndexMap<EntityId, E> {
        &self.entities
    }

    /// Identities in insertion order
    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store holds no entities
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Named partition
    pub fn partition(&self, name: &str) -> Option<&PaginatorState> {
        self.partitions.get(name)
    }

    /// Commit counter; bumps on every published snapshot
    pub fn version(&self) -> u64 {
        self.version
    }
}

// ============================================================================
// StoreConfig
// ============================================================================

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Collection name, used by registries and index names
    pub name: String,
    /// Capacity of the async change channel
    #[serde(default = "default_change_buffer")]
    pub change_buffer: usize,
}

fn default_change_buffer() -> usize {
    DEFAULT_CHANGE_BUFFER
}

impl StoreConfig {
    /// Config with defaults for `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }
}

// ============================================================================
// Listeners
// ============================================================================

type ListenerFn<E> = Arc<dyn Fn(&StoreState<E>, &ChangeBatch) + Send + Sync>;

struct Listener<E> {
    id: u64,
    callback: ListenerFn<E>,
}

/// Handle keeping a store listener registered
///
/// The listener is removed when the handle is dropped or
/// [`unsubscribe`](ChangeSubscription::unsubscribe) is called.
pub struct ChangeSubscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ChangeSubscription {
    /// Remove the listener now
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ============================================================================
// EntityStore
// ============================================================================

struct StoreInner<E: Entity> {
    name: String,
    state: watch::Sender<Arc<StoreState<E>>>,
    commit_lock: Mutex<()>,
    listeners: Mutex<Vec<Listener<E>>>,
    next_listener_id: AtomicU64,
    changes: broadcast::Sender<ChangeBatch>,
    loading: watch::Sender<usize>,
    claims: Mutex<HashSet<String>>,
}

/// Ordered, identity-keyed entity collection with change notifications
///
/// Cheap to clone; clones share the same state.
///
/// ## Example
///
/// ```rust,ignore
/// let users = EntityStore::<User>::new("users");
/// users.upsert_many(vec![alice, bob]);
///
/// users.transaction(|txn| {
///     txn.remove(&EntityId::from(1i64));
///     txn.upsert(carol);
///     Ok(())
/// })?;
/// ```
pub struct EntityStore<E: Entity> {
    inner: Arc<StoreInner<E>>,
}

impl<E: Entity> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> std::fmt::Debug for EntityStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.snapshot();
        f.debug_struct("EntityStore")
            .field("name", &self.inner.name)
            .field("entities", &state.len())
            .field("version", &state.version)
            .finish()
    }
}

impl<E: Entity> EntityStore<E> {
    /// Create an empty store
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(StoreConfig::new(name))
    }

    /// Create an empty store from a config
    pub fn with_config(config: StoreConfig) -> Self {
        let (state, _) = watch::channel(Arc::new(StoreState::default()));
        let (changes, _) = broadcast::channel(config.change_buffer.max(1));
        let (loading, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                name: config.name,
                state,
                commit_lock: Mutex::new(()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                changes,
                loading,
                claims: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // ========== Reads ==========

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<StoreState<E>> {
        Arc::clone(&self.inner.state.borrow())
    }

    /// Entity by identity
    pub fn get(&self, id: &EntityId) -> Option<E> {
        self.inner.state.borrow().get(id).cloned()
    }

    /// Whether the identity is present
    pub fn has(&self, id: &EntityId) -> bool {
        self.inner.state.borrow().has(id)
    }

    /// Identities in insertion order
    pub fn ids(&self) -> Vec<EntityId> {
        self.inner.state.borrow().ids().cloned().collect()
    }

    /// Entities in insertion order
    pub fn all(&self) -> Vec<E> {
        self.inner.state.borrow().entities.values().cloned().collect()
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.inner.state.borrow().len()
    }

    /// Whether the store holds no entities
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().is_empty()
    }

    /// Named partition
    pub fn partition(&self, name: &str) -> Option<PaginatorState> {
        self.inner.state.borrow().partition(name).cloned()
    }

    /// Reserve a partition name for one owner
    ///
    /// Returns `None` if the name is already claimed. The claim is released
    /// when the returned handle drops; the partition data itself stays.
    pub fn claim_partition(&self, name: impl Into<String>) -> Option<PartitionClaim> {
        let name = name.into();
        if !self.inner.claims.lock().insert(name.clone()) {
            return None;
        }
        let weak: Weak<StoreInner<E>> = Arc::downgrade(&self.inner);
        Some(PartitionClaim {
            name: name.clone(),
            release: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.claims.lock().remove(&name);
                }
            })),
        })
    }

    // ========== Live reads ==========

    /// Raw watch receiver over snapshots
    pub fn watch(&self) -> watch::Receiver<Arc<StoreState<E>>> {
        self.inner.state.subscribe()
    }

    /// Live value of one entity (`None` while absent)
    pub fn select(&self, id: EntityId) -> BoxStream<'static, Option<E>> {
        select_distinct(self.watch(), move |state| state.get(&id).cloned())
    }

    /// Live list of all entities
    pub fn select_all(&self) -> BoxStream<'static, Vec<E>> {
        select_distinct(self.watch(), |state| state.entities.values().cloned().collect())
    }

    /// Live value of a named partition
    pub fn select_partition(&self, name: impl Into<String>) -> BoxStream<'static, Option<PaginatorState>> {
        let name = name.into();
        select_distinct(self.watch(), move |state| state.partition(&name).cloned())
    }

    /// Async receiver of change batches
    ///
    /// Slow receivers may lag and miss batches; components that must see every
    /// batch use [`listen`](Self::listen) instead.
    pub fn changes(&self) -> broadcast::Receiver<ChangeBatch> {
        self.inner.changes.subscribe()
    }

    /// Register a synchronous listener for change batches
    pub fn listen<F>(&self, callback: F) -> ChangeSubscription
    where
        F: Fn(&StoreState<E>, &ChangeBatch) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push(Listener {
            id,
            callback: Arc::new(callback),
        });
        trace!(target: "facet::store", store = %self.inner.name, listener = id, "Listener registered");

        let weak: Weak<StoreInner<E>> = Arc::downgrade(&self.inner);
        ChangeSubscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.listeners.lock().retain(|l| l.id != id);
                    trace!(target: "facet::store", store = %inner.name, listener = id, "Listener removed");
                }
            })),
        }
    }

    /// Register a listener after running `init` on the current snapshot
    ///
    /// No commit can happen between `init` and the registration, so state
    /// seeded by `init` and then maintained by `callback` misses no batch.
    pub fn listen_from<I, F>(&self, init: I, callback: F) -> ChangeSubscription
    where
        I: FnOnce(&StoreState<E>),
        F: Fn(&StoreState<E>, &ChangeBatch) + Send + Sync + 'static,
    {
        let _commit = self.inner.commit_lock.lock();
        init(&self.snapshot());
        self.listen(callback)
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    // ========== Transactions ==========

    /// Run `f` against a draft and publish it atomically on `Ok`
    ///
    /// On `Err` the draft is discarded and nothing is published.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut StoreTransaction<E>) -> Result<T>,
    ) -> Result<T> {
        self.run(f)
    }

    fn run<T, Err>(
        &self,
        f: impl FnOnce(&mut StoreTransaction<E>) -> std::result::Result<T, Err>,
    ) -> std::result::Result<T, Err> {
        let _commit = self.inner.commit_lock.lock();
        let mut txn = StoreTransaction::new(self.snapshot());
        let out = f(&mut txn)?;
        self.commit(txn);
        Ok(out)
    }

    /// Run an infallible transaction and publish it
    pub fn write<T>(&self, f: impl FnOnce(&mut StoreTransaction<E>) -> T) -> T {
        match self.run(|txn| Ok::<T, Infallible>(f(txn))) {
            Ok(out) => out,
            Err(never) => match never {},
        }
    }

    /// Publish a finished transaction; caller holds the commit lock
    fn commit(&self, txn: StoreTransaction<E>) {
        let (draft, mut batch) = txn.finish();
        let Some(mut next) = draft else {
            return;
        };

        next.version += 1;
        batch.version = next.version;
        let next = Arc::new(next);

        if batch.is_empty() {
            self.inner.state.send_replace(next);
            trace!(target: "facet::store", store = %self.inner.name, version = batch.version, "State updated");
            return;
        }

        debug!(
            target: "facet::store",
            store = %self.inner.name,
            version = next.version,
            changes = batch.len(),
            "Transaction committed"
        );

        let listeners: Vec<ListenerFn<E>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|l| Arc::clone(&l.callback))
            .collect();
        for listener in listeners {
            listener(&next, &batch);
        }

        // Derived state is current before readers see the new snapshot
        self.inner.state.send_replace(next);

        // No receivers is fine
        let _ = self.inner.changes.send(batch);
    }

    // ========== Writes ==========

    /// Insert an entity that does not exist yet
    pub fn add(&self, entity: E) -> bool {
        self.write(|txn| txn.add(entity))
    }

    /// Insert or replace an entity
    pub fn upsert(&self, entity: E) {
        self.write(|txn| txn.upsert(entity))
    }

    /// Insert or replace several entities in one commit
    pub fn upsert_many(&self, entities: impl IntoIterator<Item = E>) -> usize {
        self.write(|txn| txn.upsert_many(entities))
    }

    /// Modify an existing entity in place
    pub fn update(&self, id: &EntityId, f: impl FnOnce(&mut E)) -> bool {
        self.write(|txn| txn.update(id, f))
    }

    /// Remove an entity
    pub fn remove(&self, id: &EntityId) -> Option<E> {
        self.write(|txn| txn.remove(id))
    }

    /// Remove several entities in one commit
    pub fn remove_many<'a>(&self, ids: impl IntoIterator<Item = &'a EntityId>) -> usize {
        self.write(|txn| txn.remove_many(ids))
    }

    /// Remove every entity in one commit
    pub fn clear(&self) -> usize {
        self.write(|txn| txn.clear())
    }

    // ========== Loading ==========

    /// Mark the store as loading until the guard is dropped
    ///
    /// Guards nest: the store is loading while at least one is alive.
    pub fn loading_guard(&self) -> LoadingGuard {
        self.inner.loading.send_modify(|n| *n += 1);
        LoadingGuard {
            loading: self.inner.loading.clone(),
        }
    }

    /// Whether any loading guard is alive
    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow() > 0
    }

    /// Live loading flag
    pub fn select_loading(&self) -> BoxStream<'static, bool> {
        select_distinct(self.inner.loading.subscribe(), |n| *n > 0)
    }
}

/// Exclusive use of a partition name, released on drop
pub struct PartitionClaim {
    name: String,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl PartitionClaim {
    /// Claimed partition name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PartitionClaim {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for PartitionClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionClaim")
            .field("name", &self.name)
            .finish()
    }
}

/// Keeps its store in the loading state while alive
#[derive(Debug)]
pub struct LoadingGuard {
    loading: watch::Sender<usize>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.loading.send_modify(|n| *n = n.saturating_sub(1));
    }
}
