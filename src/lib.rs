//! Facet - secondary indexes and page caches over reactive entity stores
//!
//! Facet keeps entities in identity-keyed stores and layers two views on top:
//! string-keyed secondary indexes that follow every commit, and paginators
//! that cache pages of identities and render them from the live store.
//!
//! # Quick Start
//!
//! ```ignore
//! use facet::{EntityStore, IndexedStore, Paginator};
//!
//! let users = EntityStore::<User>::new("users");
//! let indexed = IndexedStore::builder(users.clone())
//!     .index("email", |user: &User| Some(user.email.clone()))
//!     .build()?;
//!
//! let paginator = Paginator::builder(users).name("directory").build()?;
//! let mut pages = paginator.get_page(move |page| api.users(page));
//!
//! let alice = indexed.index_query("email")?.get_entity("alice@example.com");
//! ```
//!
//! # Architecture
//!
//! - `facet-core`: identities, the pagination record and fetch response shapes
//! - `facet-store`: entity stores, transactions, change batches, registry
//! - `facet-index`: secondary indexes and key lookups
//! - `facet-paginator`: page cache, navigation and page streams

pub use facet_core::*;
pub use facet_index::*;
pub use facet_paginator::*;
pub use facet_store::*;
