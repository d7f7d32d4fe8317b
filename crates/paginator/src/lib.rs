//! Page caches for facet
//!
//! This crate caches pages of entity identities inside an entity store:
//! - Paginator: pagination record, page cache and navigation
//! - PageStream: fetch-or-serve driver following the current page
//! - PaginatorConfig: TOML-loadable settings
//! - Operators: leading debounce and non-dropping fetch throttle

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controls;
pub mod fetch;
pub mod metadata;
pub mod operators;
pub mod paginator;
pub mod stream;

pub use config::{PaginatorConfig, DEFAULT_THROTTLE_MS};
pub use controls::{generate_pages, page_window};
pub use fetch::PageFetcher;
pub use metadata::PaginatorMetadata;
pub use operators::{FetchThrottle, LeadingDebounce, Reservation};
pub use paginator::{
    CacheTimeout, ClearCacheOptions, DestroyOptions, EntityNotFoundFn, Paginator,
    PaginatorBuilder,
};
pub use stream::PageStream;
