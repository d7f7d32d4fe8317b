//! Secondary indexes for facet entity stores
//!
//! An index maps an arbitrary string key extracted from each entity to the
//! entity's identity, and back. Indexes follow their store synchronously:
//! every committed change batch is applied to the index inside the commit.
//!
//! - IndexState: the bidirectional mapping and its pure batch transition
//! - IndexStore: one live index attached to a store
//! - IndexQuery: key -> entity lookups, point and live
//! - IndexedStore: a store with several named indexes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod index_store;
pub mod indexed;
pub mod query;
pub mod state;

pub use index_store::{IndexDefinition, IndexStore};
pub use indexed::{IndexedStore, IndexedStoreBuilder};
pub use query::IndexQuery;
pub use state::IndexState;
