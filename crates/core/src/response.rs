//! Fetch response shapes and rendered pages
//!
//! A fetch function answers with one of two shapes:
//!
//! - **Raw**: `{data, currentPage, perPage, lastPage, total?}` where `data` is
//!   either the entities themselves or only their identities.
//! - **Normalized**: `{result: {data: [id], ...}, entities: {collection: {id: entity}}}`,
//!   so one response can feed several collections.
//!
//! Both deserialize from JSON with camelCase field names.

use crate::types::{Entity, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entities of one collection keyed by identity (as JSON object keys)
pub type EntitiesById = BTreeMap<String, serde_json::Value>;

/// Entities grouped by target collection name
pub type NormalizedEntities = BTreeMap<String, EntitiesById>;

/// Pagination numbers carried by every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Page the response describes
    pub current_page: u32,
    /// Page size
    pub per_page: u32,
    /// Last available page
    pub last_page: u32,
    /// Total items, if the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl PageInfo {
    /// Numbers for `current_page` of `last_page` pages of `per_page` items
    pub fn new(current_page: u32, per_page: u32, last_page: u32) -> Self {
        Self {
            current_page,
            per_page,
            last_page,
            total: None,
        }
    }

    /// Attach a reported total
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }
}

/// Data of a raw response: whole entities or identities only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageData<E> {
    /// Identities only; entities arrive through other channels
    Ids(Vec<EntityId>),
    /// Full entities, upserted into the paginated collection
    Entities(Vec<E>),
}

impl<E> PageData<E> {
    /// Number of items carried
    pub fn len(&self) -> usize {
        match self {
            PageData::Ids(ids) => ids.len(),
            PageData::Entities(entities) => entities.len(),
        }
    }

    /// Whether no items were carried
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Entity> PageData<E> {
    /// Identities in response order
    pub fn ids(&self) -> Vec<EntityId> {
        match self {
            PageData::Ids(ids) => ids.clone(),
            PageData::Entities(entities) => entities.iter().map(Entity::id).collect(),
        }
    }
}

/// Raw response: pagination numbers plus data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage<E> {
    /// Pagination numbers
    #[serde(flatten)]
    pub info: PageInfo,
    /// Page contents
    pub data: PageData<E>,
}

/// Identity list part of a normalized response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedIds {
    /// Pagination numbers
    #[serde(flatten)]
    pub info: PageInfo,
    /// Page contents
    pub data: Vec<EntityId>,
}

/// Normalized response: identities plus entities grouped by collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPage {
    /// Identities of the page
    pub result: PaginatedIds,
    /// Side table of entities per collection
    #[serde(default)]
    pub entities: NormalizedEntities,
}

/// Anything a fetch function may return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchResponse<E> {
    /// Identity list plus per-collection entity table
    Normalized(NormalizedPage),
    /// Entities or identities inline
    Raw(RawPage<E>),
}

impl<E> FetchResponse<E> {
    /// Raw response carrying whole entities
    pub fn entities(info: PageInfo, entities: Vec<E>) -> Self {
        FetchResponse::Raw(RawPage {
            info,
            data: PageData::Entities(entities),
        })
    }

    /// Raw response carrying identities only
    pub fn ids(info: PageInfo, ids: Vec<EntityId>) -> Self {
        FetchResponse::Raw(RawPage {
            info,
            data: PageData::Ids(ids),
        })
    }

    /// Normalized response
    pub fn normalized(info: PageInfo, ids: Vec<EntityId>, entities: NormalizedEntities) -> Self {
        FetchResponse::Normalized(NormalizedPage {
            result: PaginatedIds { info, data: ids },
            entities,
        })
    }

    /// Pagination numbers of either shape
    pub fn info(&self) -> &PageInfo {
        match self {
            FetchResponse::Normalized(page) => &page.result.info,
            FetchResponse::Raw(page) => &page.info,
        }
    }

    /// Number of items carried
    pub fn data_len(&self) -> usize {
        match self {
            FetchResponse::Normalized(page) => page.result.data.len(),
            FetchResponse::Raw(page) => page.data.len(),
        }
    }
}

/// Marker for an identity whose entity is not in the collection yet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    /// Identity waiting for its entity
    pub id: EntityId,
}

/// One slot of a rendered page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PageItem<E> {
    /// Entity resolved from the collection
    Entity(E),
    /// Identity known, value pending
    Placeholder(Placeholder),
}

impl<E> PageItem<E> {
    /// Whether this slot is a placeholder
    pub fn is_placeholder(&self) -> bool {
        matches!(self, PageItem::Placeholder(_))
    }

    /// Resolved entity, if any
    pub fn as_entity(&self) -> Option<&E> {
        match self {
            PageItem::Entity(entity) => Some(entity),
            PageItem::Placeholder(_) => None,
        }
    }
}

/// A cached page projected through the live collection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<E> {
    /// Current page of the paginator
    pub current_page: u32,
    /// Page size
    pub per_page: u32,
    /// Last available page
    pub last_page: u32,
    /// Total items
    pub total: u64,
    /// Page contents
    pub data: Vec<PageItem<E>>,
    /// First item index (when range output is enabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    /// Last item index (when range output is enabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<u64>,
    /// Every page number (when page controls are enabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_controls: Option<Vec<u32>>,
}

impl<E> PageResponse<E> {
    /// Resolved entities, skipping placeholders
    pub fn entities(&self) -> impl Iterator<Item = &E> {
        self.data.iter().filter_map(PageItem::as_entity)
    }

    /// Identities still waiting for their entity
    pub fn placeholders(&self) -> impl Iterator<Item = &EntityId> {
        self.data.iter().filter_map(|item| match item {
            PageItem::Placeholder(p) => Some(&p.id),
            PageItem::Entity(_) => None,
        })
    }
}
