//! Paginator state record
//!
//! One `PaginatorState` exists per named paginator and lives as a partition of
//! its host store. Every transition consumes the current record and returns the
//! next one, so a store commit always swaps a complete state in a single step.

use crate::response::PageInfo;
use crate::types::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form metadata attached to a paginator by its caller
pub type PaginatorMetadataMap = BTreeMap<String, serde_json::Value>;

/// Ordered identities cached for one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIds {
    /// Identities in the order the backend returned them
    pub ids: Vec<EntityId>,
}

impl PageIds {
    /// Wrap an identity list
    pub fn new(ids: Vec<EntityId>) -> Self {
        Self { ids }
    }
}

/// Pagination record for one paginator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatorState {
    /// Current page (1-based)
    pub current_page: u32,
    /// Page size reported by the backend
    pub per_page: u32,
    /// Last page reported by the backend
    pub last_page: u32,
    /// Total number of items, reported or inferred
    pub total: u64,
    /// Cached pages, sparse
    pub pages: BTreeMap<u32, PageIds>,
    /// Caller-attached metadata
    pub metadata: PaginatorMetadataMap,
}

impl Default for PaginatorState {
    fn default() -> Self {
        Self::initial(1)
    }
}

impl PaginatorState {
    /// Empty state positioned on `start_page`
    pub fn initial(start_page: u32) -> Self {
        Self {
            current_page: start_page.max(1),
            per_page: 0,
            last_page: 0,
            total: 0,
            pages: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    // ========== Queries ==========

    /// Whether `page` has cached identities
    pub fn has_page(&self, page: u32) -> bool {
        self.pages.contains_key(&page)
    }

    /// Cached identities of `page`
    pub fn page(&self, page: u32) -> Option<&PageIds> {
        self.pages.get(&page)
    }

    /// Whether the current page is the first one
    pub fn is_first(&self) -> bool {
        self.current_page == 1
    }

    /// Whether the current page is the last one reported by the backend
    pub fn is_last(&self) -> bool {
        self.current_page == self.last_page
    }

    /// 1-based index of the first item shown on the current page
    pub fn from(&self) -> u64 {
        if self.is_first() {
            return 1;
        }
        u64::from(self.current_page.saturating_sub(1)) * u64::from(self.per_page) + 1
    }

    /// 1-based index of the last item shown on the current page
    pub fn to(&self) -> u64 {
        if self.is_last() {
            return self.total;
        }
        u64::from(self.current_page) * u64::from(self.per_page)
    }

    // ========== Transitions ==========

    /// Move to `page`
    pub fn with_current_page(mut self, page: u32) -> Self {
        self.current_page = page;
        self
    }

    /// Merge the pagination numbers of a fetch response
    ///
    /// `data_len` is the number of items the response carried; it is the
    /// total when the backend omits one and reports a single page.
    pub fn with_page_info(mut self, info: &PageInfo, data_len: usize) -> Self {
        self.current_page = info.current_page;
        self.per_page = info.per_page;
        self.last_page = info.last_page;
        self.total = infer_total(info, data_len);
        self
    }

    /// Cache `ids` as the contents of `page`
    pub fn with_page(mut self, page: u32, ids: Vec<EntityId>) -> Self {
        self.pages.insert(page, PageIds::new(ids));
        self
    }

    /// Evict one cached page
    pub fn without_page(mut self, page: u32) -> Self {
        self.pages.remove(&page);
        self
    }

    /// Evict every cached page, keeping totals and metadata
    pub fn without_pages(mut self) -> Self {
        self.pages.clear();
        self
    }

    /// Set one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Total number of items described by a response
///
/// Uses the reported total when present. Otherwise a single-page response is
/// counted by its data length and a multi-page response is assumed full:
/// `last_page * per_page`.
pub fn infer_total(info: &PageInfo, data_len: usize) -> u64 {
    match info.total {
        Some(total) => total,
        None if info.last_page == 1 => data_len as u64,
        None => u64::from(info.last_page) * u64::from(info.per_page),
    }
}
