//! Core types for facet
//!
//! This crate defines the foundational types used throughout the system:
//! - EntityId / Entity: identity and the trait every stored value implements
//! - PaginatorState: the per-paginator record kept inside a host store
//! - Fetch response shapes: raw and normalized pages, rendered page items
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod pagination;
pub mod response;
pub mod types;

pub use error::{Error, Result};
pub use pagination::{infer_total, PageIds, PaginatorMetadataMap, PaginatorState};
pub use response::{
    EntitiesById, FetchResponse, NormalizedEntities, NormalizedPage, PageData, PageInfo, PageItem,
    PageResponse, PaginatedIds, Placeholder, RawPage,
};
pub use types::{Entity, EntityId};
