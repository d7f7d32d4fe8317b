//! Store transactions
//!
//! A `StoreTransaction` is a copy-on-write draft of the store state. Reads see
//! the draft's own writes. Nothing becomes visible to other readers until the
//! owning `EntityStore::transaction` call returns `Ok`, at which point the draft
//! is published as one new snapshot together with one change batch.

use crate::change::{ChangeBatch, ChangeKind};
use crate::store::StoreState;
use facet_core::{Entity, EntityId, PaginatorState};
use std::sync::Arc;

/// Draft of a store state inside a transaction
pub struct StoreTransaction<E: Entity> {
    base: Arc<StoreState<E>>,
    draft: Option<StoreState<E>>,
    batch: ChangeBatch,
}

impl<E: Entity> StoreTransaction<E> {
    pub(crate) fn new(base: Arc<StoreState<E>>) -> Self {
        Self {
            base,
            draft: None,
            batch: ChangeBatch::default(),
        }
    }

    fn view(&self) -> &StoreState<E> {
        match &self.draft {
            Some(draft) => draft,
            None => self.base.as_ref(),
        }
    }

    fn draft_mut(&mut self) -> &mut StoreState<E> {
        let base = &self.base;
        self.draft.get_or_insert_with(|| (**base).clone())
    }

    /// Split into the written draft (if any) and the recorded changes
    pub(crate) fn finish(self) -> (Option<StoreState<E>>, ChangeBatch) {
        (self.draft, self.batch)
    }

    // ========== Reads ==========

    /// Entity as seen by this transaction
    pub fn get(&self, id: &EntityId) -> Option<&E> {
        self.view().get(id)
    }

    /// Whether the entity exists in this transaction
    pub fn has(&self, id: &EntityId) -> bool {
        self.view().has(id)
    }

    /// Number of entities as seen by this transaction
    pub fn len(&self) -> usize {
        self.view().len()
    }

    /// Whether the transaction sees no entities
    pub fn is_empty(&self) -> bool {
        self.view().is_empty()
    }

    /// Named partition as seen by this transaction
    pub fn partition(&self, name: &str) -> Option<&PaginatorState> {
        self.view().partition(name)
    }

    /// Changes recorded so far
    pub fn changes(&self) -> &ChangeBatch {
        &self.batch
    }

    // ========== Entity writes ==========

    /// Insert an entity that does not exist yet
    ///
    /// Returns `false` and leaves the store untouched if the identity is taken.
    pub fn add(&mut self, entity: E) -> bool {
        let id = entity.id();
        if self.has(&id) {
            return false;
        }
        self.draft_mut().entities.insert(id.clone(), entity);
        self.batch.push(ChangeKind::Add, id);
        true
    }

    /// Insert or replace an entity
    pub fn upsert(&mut self, entity: E) {
        let id = entity.id();
        let kind = if self.has(&id) {
            ChangeKind::Update
        } else {
            ChangeKind::Add
        };
        self.draft_mut().entities.insert(id.clone(), entity);
        self.batch.push(kind, id);
    }

    /// Insert or replace several entities
    pub fn upsert_many(&mut self, entities: impl IntoIterator<Item = E>) -> usize {
        let mut count = 0;
        for entity in entities {
            self.upsert(entity);
            count += 1;
        }
        count
    }

    /// Modify an existing entity in place
    ///
    /// The closure must not change the entity's identity. Returns `false` if
    /// the entity does not exist.
    pub fn update(&mut self, id: &EntityId, f: impl FnOnce(&mut E)) -> bool {
        if !self.has(id) {
            return false;
        }
        if let Some(entity) = self.draft_mut().entities.get_mut(id) {
            f(entity);
        }
        self.batch.push(ChangeKind::Update, id.clone());
        true
    }

    /// Remove an entity, returning it
    pub fn remove(&mut self, id: &EntityId) -> Option<E> {
        if !self.has(id) {
            return None;
        }
        let removed = self.draft_mut().entities.shift_remove(id);
        self.batch.push(ChangeKind::Remove, id.clone());
        removed
    }

    /// Remove several entities, returning how many existed
    pub fn remove_many<'a>(&mut self, ids: impl IntoIterator<Item = &'a EntityId>) -> usize {
        ids.into_iter()
            .filter_map(|id| self.remove(id))
            .count()
    }

    /// Remove every entity
    pub fn clear(&mut self) -> usize {
        let ids: Vec<EntityId> = self.view().entities.keys().cloned().collect();
        self.remove_many(ids.iter())
    }

    // ========== Partition writes ==========

    /// Replace a named partition
    pub fn set_partition(&mut self, name: impl Into<String>, state: PaginatorState) {
        self.draft_mut().partitions.insert(name.into(), state);
    }

    /// Transform a named partition, creating it from `init` when absent
    pub fn update_partition(
        &mut self,
        name: &str,
        init: impl FnOnce() -> PaginatorState,
        f: impl FnOnce(PaginatorState) -> PaginatorState,
    ) {
        let current = self.partition(name).cloned().unwrap_or_else(init);
        self.set_partition(name, f(current));
    }

    /// Drop a named partition
    pub fn remove_partition(&mut self, name: &str) -> Option<PaginatorState> {
        if self.partition(name).is_none() {
            return None;
        }
        self.draft_mut().partitions.remove(name)
    }
}
