//! Per-key access to paginator metadata

use crate::paginator::Paginator;
use facet_core::Entity;
use futures::stream::BoxStream;
use serde_json::Value;

/// Metadata view of a [`Paginator`]
#[derive(Clone)]
pub struct PaginatorMetadata<E: Entity> {
    paginator: Paginator<E>,
}

impl<E: Entity> PaginatorMetadata<E> {
    pub(crate) fn new(paginator: Paginator<E>) -> Self {
        Self { paginator }
    }

    /// Value under `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.paginator.get_metadata().remove(key)
    }

    /// Live value under `key`
    pub fn select(&self, key: impl Into<String>) -> BoxStream<'static, Option<Value>> {
        let key = key.into();
        self.paginator
            .select_with(move |state| state.metadata.get(&key).cloned())
    }

    /// Set the value under `key`
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.paginator.set_metadata(key, value);
    }
}
