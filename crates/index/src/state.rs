//! Bidirectional index state
//!
//! `IndexState` holds the two halves of a secondary index:
//! - `ids`: identity -> index key
//! - `idx`: index key -> identity
//!
//! Invariant: for every entry, `ids[id] == k` if and only if `idx[k] == id`.
//! A key maps to at most one identity; on collision the most recently
//! processed identity wins and the loser leaves both maps.

use facet_core::EntityId;
use facet_store::{ChangeBatch, StoreState};
use std::collections::{HashMap, HashSet};

/// Snapshot of one secondary index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexState {
    ids: HashMap<EntityId, String>,
    idx: HashMap<String, EntityId>,
    version: u64,
}

impl IndexState {
    /// Build the index for every entity of a store snapshot
    pub fn seed<E>(store: &StoreState<E>, key_of: impl Fn(&E) -> Option<String>) -> Self {
        let mut state = Self {
            version: store.version(),
            ..Self::default()
        };
        for (id, entity) in store.entities() {
            match key_of(entity) {
                Some(key) => state.upsert(id, key),
                None => state.remove(id),
            }
        }
        state
    }

    /// Apply one change batch, returning the next state
    ///
    /// Every identity touched by the batch is reconciled against `lookup`,
    /// which returns the key of the committed entity (or `None` when the
    /// entity is gone or exposes no key). Identities are processed in batch
    /// order, so later upserts win key collisions.
    pub fn apply(&self, batch: &ChangeBatch, lookup: impl Fn(&EntityId) -> Option<String>) -> Self {
        let mut next = self.clone();
        next.version = batch.version;

        let mut seen = HashSet::new();
        for (_, id) in batch.iter() {
            if !seen.insert(id) {
                continue;
            }
            match lookup(id) {
                Some(key) => next.upsert(id, key),
                None => next.remove(id),
            }
        }
        next
    }

    fn upsert(&mut self, id: &EntityId, key: String) {
        if key.is_empty() {
            self.remove(id);
            return;
        }
        if self.ids.get(id) == Some(&key) {
            return;
        }

        // Stale reverse entry for the previous key
        self.remove(id);

        if let Some(loser) = self.idx.insert(key.clone(), id.clone()) {
            self.ids.remove(&loser);
        }
        self.ids.insert(id.clone(), key);
    }

    fn remove(&mut self, id: &EntityId) {
        if let Some(old) = self.ids.remove(id) {
            if self.idx.get(&old) == Some(id) {
                self.idx.remove(&old);
            }
        }
    }

    /// Identity holding `key`
    pub fn resolve(&self, key: &str) -> Option<&EntityId> {
        self.idx.get(key)
    }

    /// Key held by `id`
    pub fn index_key(&self, id: &EntityId) -> Option<&str> {
        self.ids.get(id).map(String::as_str)
    }

    /// Number of indexed identities
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Store version this state reflects
    pub fn version(&self) -> u64 {
        self.version
    }

    /// (key, identity) pairs in arbitrary order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &EntityId)> {
        self.idx.iter().map(|(k, id)| (k.as_str(), id))
    }

    /// Whether both directions agree
    pub fn is_consistent(&self) -> bool {
        self.ids.len() == self.idx.len()
            && self
                .ids
                .iter()
                .all(|(id, key)| self.idx.get(key) == Some(id))
    }
}
