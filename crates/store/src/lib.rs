//! Entity stores for facet
//!
//! This crate provides the reactive state container the rest of facet builds on:
//! - EntityStore: ordered, identity-keyed collection with transactions
//! - ChangeBatch: one notification per committed transaction
//! - select_distinct: live, duplicate-suppressing projections of store state
//! - StoreRegistry: name-based routing for normalized payloads

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod observe;
pub mod registry;
pub mod store;
pub mod transaction;

pub use change::{ChangeBatch, ChangeKind, EntityChange};
pub use observe::select_distinct;
pub use registry::{ErasedStore, PendingUpsert, StoreRegistry};
pub use store::{
    ChangeSubscription, EntityStore, LoadingGuard, PartitionClaim, StoreConfig, StoreState,
};
pub use transaction::StoreTransaction;
