//! Change notifications emitted by entity stores
//!
//! Every committed transaction that touched entities produces exactly one
//! `ChangeBatch`. A batch lists the operations in commit order; consecutive
//! operations of the same kind are merged into a single `EntityChange`.

use facet_core::EntityId;
use serde::{Deserialize, Serialize};

/// Kind of entity operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Entity inserted for the first time
    Add,
    /// Existing entity replaced or modified
    Update,
    /// Entity removed
    Remove,
}

/// One operation kind and the identities it affected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityChange {
    /// Operation kind
    pub kind: ChangeKind,
    /// Affected identities, in operation order
    pub ids: Vec<EntityId>,
}

/// All entity operations of one committed transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Store version produced by the commit
    pub version: u64,
    /// Operations in commit order
    pub changes: Vec<EntityChange>,
}

impl ChangeBatch {
    /// Record one operation
    pub fn push(&mut self, kind: ChangeKind, id: EntityId) {
        match self.changes.last_mut() {
            Some(last) if last.kind == kind => last.ids.push(id),
            _ => self.changes.push(EntityChange { kind, ids: vec![id] }),
        }
    }

    /// Whether no entity was touched
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of recorded operations
    pub fn len(&self) -> usize {
        self.changes.iter().map(|c| c.ids.len()).sum()
    }

    /// Every (kind, id) pair in commit order
    pub fn iter(&self) -> impl Iterator<Item = (ChangeKind, &EntityId)> {
        self.changes
            .iter()
            .flat_map(|change| change.ids.iter().map(move |id| (change.kind, id)))
    }

    /// Whether `id` appears in the batch
    pub fn touches(&self, id: &EntityId) -> bool {
        self.iter().any(|(_, touched)| touched == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_merges_consecutive_kinds() {
        let mut batch = ChangeBatch::default();
        batch.push(ChangeKind::Add, EntityId::from(1i64));
        batch.push(ChangeKind::Add, EntityId::from(2i64));
        batch.push(ChangeKind::Remove, EntityId::from(1i64));
        batch.push(ChangeKind::Add, EntityId::from(3i64));

        assert_eq!(batch.changes.len(), 3);
        assert_eq!(batch.changes[0].ids.len(), 2);
        assert_eq!(batch.changes[1].kind, ChangeKind::Remove);
        assert_eq!(batch.len(), 4);
    }

    #[test]
    fn test_iter_preserves_order() {
        let mut batch = ChangeBatch::default();
        batch.push(ChangeKind::Update, EntityId::from("a"));
        batch.push(ChangeKind::Remove, EntityId::from("b"));

        let seen: Vec<_> = batch.iter().map(|(k, id)| (k, id.clone())).collect();
        assert_eq!(
            seen,
            vec![
                (ChangeKind::Update, EntityId::from("a")),
                (ChangeKind::Remove, EntityId::from("b")),
            ]
        );
        assert!(batch.touches(&EntityId::from("b")));
        assert!(!batch.touches(&EntityId::from("c")));
    }
}
