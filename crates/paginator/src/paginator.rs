//! Paginator engine
//!
//! A `Paginator` keeps one [`PaginatorState`] as a named partition of its
//! entity store and serves pages of entities out of it.
//!
//! ## Design Principles
//!
//! 1. **Identities only**: the paginator caches identity lists per page. Entity
//!    values always come from the live store, so a page re-renders whenever one
//!    of its entities changes.
//! 2. **One transaction per fetch**: merging a response updates the pagination
//!    numbers, records the page and upserts the page's entities in one commit.
//! 3. **No-op navigation**: moving to the page that is already current does
//!    not touch the store, except to create the partition the first time.
//!
//! ## Example
//!
//! ```rust,ignore
//! let paginator = Paginator::builder(posts.clone())
//!     .name("feed")
//!     .registry(registry)
//!     .build()?
//!     .with_range();
//!
//! let mut pages = paginator.get_page(move |page| api.posts(page));
//! while let Some(page) = pages.next().await {
//!     render(page?);
//! }
//! ```

use crate::config::PaginatorConfig;
use crate::controls::{generate_pages, page_window};
use crate::fetch::PageFetcher;
use crate::metadata::PaginatorMetadata;
use crate::operators::{FetchThrottle, Reservation};
use crate::stream::PageStream;
use facet_core::{
    Entity, EntityId, Error, FetchResponse, PageData, PageItem, PageResponse,
    PaginatorMetadataMap, PaginatorState, Placeholder, Result,
};
use facet_store::{
    select_distinct, EntityStore, PartitionClaim, StoreRegistry, StoreState, StoreTransaction,
};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

static NEXT_PAGINATOR: AtomicU64 = AtomicU64::new(1);

fn generated_name() -> String {
    format!("paginator_{}", NEXT_PAGINATOR.fetch_add(1, Ordering::Relaxed))
}

/// Callback receiving identities that a rendered page could not resolve
pub type EntityNotFoundFn = Arc<dyn Fn(Vec<EntityId>) + Send + Sync>;

/// Signal stream; every item clears the cache
pub type CacheTimeout = BoxStream<'static, ()>;

/// Options for [`Paginator::clear_cache_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearCacheOptions {
    /// Override `clear_store_with_cache` for this call
    pub clear_store: Option<bool>,
}

/// Options for [`Paginator::destroy`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyOptions {
    /// Clear the cache while tearing down
    pub clear_cache: bool,
    /// Page to leave the paginator on
    pub current_page: Option<u32>,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Paginator`]
pub struct PaginatorBuilder<E: Entity> {
    store: EntityStore<E>,
    config: PaginatorConfig,
    registry: Option<StoreRegistry>,
    cache_timeout: Option<CacheTimeout>,
    entity_not_found: Option<EntityNotFoundFn>,
}

impl<E: Entity> PaginatorBuilder<E> {
    /// Replace the serializable settings
    pub fn config(mut self, config: PaginatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Partition name inside the host store
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Render unresolved identities as placeholders (default) or drop them
    pub fn placeholders(mut self, enabled: bool) -> Self {
        self.config.placeholders = enabled;
        self
    }

    /// Minimum spacing between fetch calls
    pub fn throttle(mut self, window: Duration) -> Self {
        self.config.throttle_ms = window.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Registry receiving the other collections of normalized responses
    pub fn registry(mut self, registry: StoreRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Clear the cache every time `signal` yields
    ///
    /// Requires a running tokio runtime at [`build`](Self::build) time.
    pub fn cache_timeout(mut self, signal: impl futures::Stream<Item = ()> + Send + 'static) -> Self {
        self.cache_timeout = Some(signal.boxed());
        self
    }

    /// Receive identities a rendered page could not resolve
    ///
    /// The callback runs on a spawned task, never on the emission path.
    pub fn entity_not_found<F>(mut self, callback: F) -> Self
    where
        F: Fn(Vec<EntityId>) + Send + Sync + 'static,
    {
        self.entity_not_found = Some(Arc::new(callback));
        self
    }

    /// Validate the settings and create the paginator
    pub fn build(self) -> Result<Paginator<E>> {
        self.config.validate()?;
        let name = self.config.name.clone().unwrap_or_else(generated_name);
        let claim = self.store.claim_partition(name.clone()).ok_or_else(|| {
            Error::invalid_config(format!(
                "paginator name '{}' already in use on store '{}'",
                name,
                self.store.name()
            ))
        })?;

        let inner = Arc::new(PaginatorInner {
            name,
            throttle: Mutex::new(FetchThrottle::new(self.config.throttle())),
            config: RwLock::new(self.config),
            store: self.store,
            registry: self.registry,
            entity_not_found: self.entity_not_found,
            initial: AtomicBool::new(false),
            cache_timeout: Mutex::new(None),
            _claim: claim,
        });

        if let Some(signal) = self.cache_timeout {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|_| Error::invalid_config("cache_timeout needs a running tokio runtime"))?;
            let weak = Arc::downgrade(&inner);
            let task = runtime.spawn(async move {
                let mut signal = signal;
                while signal.next().await.is_some() {
                    match weak.upgrade() {
                        Some(inner) => Paginator { inner }.clear_cache(),
                        None => break,
                    }
                }
            });
            *inner.cache_timeout.lock() = Some(task);
        }

        debug!(target: "facet::paginator", paginator = %inner.name, store = %inner.store.name(), "Paginator created");
        Ok(Paginator { inner })
    }
}

// ============================================================================
// Paginator
// ============================================================================

struct PaginatorInner<E: Entity> {
    name: String,
    store: EntityStore<E>,
    registry: Option<StoreRegistry>,
    config: RwLock<PaginatorConfig>,
    entity_not_found: Option<EntityNotFoundFn>,
    initial: AtomicBool,
    throttle: Mutex<FetchThrottle>,
    cache_timeout: Mutex<Option<JoinHandle<()>>>,
    _claim: PartitionClaim,
}

impl<E: Entity> Drop for PaginatorInner<E> {
    fn drop(&mut self) {
        if let Some(task) = self.cache_timeout.get_mut().take() {
            task.abort();
        }
    }
}

/// Page cache over an [`EntityStore`]
///
/// Cheap to clone; clones share the same paginator.
pub struct Paginator<E: Entity> {
    inner: Arc<PaginatorInner<E>>,
}

impl<E: Entity> Clone for Paginator<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> std::fmt::Debug for Paginator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pagination();
        f.debug_struct("Paginator")
            .field("name", &self.inner.name)
            .field("store", &self.inner.store.name())
            .field("current_page", &state.current_page)
            .field("cached_pages", &state.pages.len())
            .finish()
    }
}

impl<E: Entity> Paginator<E> {
    /// Start configuring a paginator over `store`
    pub fn builder(store: EntityStore<E>) -> PaginatorBuilder<E> {
        PaginatorBuilder {
            store,
            config: PaginatorConfig::default(),
            registry: None,
            cache_timeout: None,
            entity_not_found: None,
        }
    }

    /// Paginator with default settings and a generated name
    pub fn new(store: EntityStore<E>) -> Result<Self> {
        Self::builder(store).build()
    }

    /// Partition name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Host store
    pub fn store(&self) -> &EntityStore<E> {
        &self.inner.store
    }

    /// Current settings
    pub fn config(&self) -> PaginatorConfig {
        self.inner.config.read().clone()
    }

    /// Attach the full page list to rendered pages from now on
    pub fn with_controls(self) -> Self {
        self.inner.config.write().pages_controls = true;
        self
    }

    /// Attach `from`/`to` to rendered pages from now on
    pub fn with_range(self) -> Self {
        self.inner.config.write().range = true;
        self
    }

    fn log(&self, action: &str, page: Option<u32>) {
        debug!(
            target: "facet::paginator",
            paginator = %self.inner.name,
            action,
            page = ?page,
            "@Paginator<{}> {}",
            self.inner.name,
            action
        );
    }

    fn initial_state(&self) -> PaginatorState {
        PaginatorState::initial(self.inner.config.read().start_with)
    }

    // ========== Reads ==========

    pub(crate) fn state_of(&self, snapshot: &StoreState<E>) -> PaginatorState {
        snapshot
            .partition(&self.inner.name)
            .cloned()
            .unwrap_or_else(|| self.initial_state())
    }

    /// Pagination record; the initial record if nothing was written yet
    pub fn pagination(&self) -> PaginatorState {
        self.state_of(&self.inner.store.snapshot())
    }

    /// Current page number
    pub fn current_page(&self) -> u32 {
        self.pagination().current_page
    }

    /// Whether `page` is cached
    pub fn has_page(&self, page: u32) -> bool {
        self.inner
            .store
            .snapshot()
            .partition(&self.inner.name)
            .map_or(false, |state| state.has_page(page))
    }

    /// Whether `page` is the current page
    pub fn is_page_active(&self, page: u32) -> bool {
        self.current_page() == page
    }

    /// Whether the current page is the first one
    pub fn is_first(&self) -> bool {
        self.pagination().is_first()
    }

    /// Whether the current page is the last one
    pub fn is_last(&self) -> bool {
        self.pagination().is_last()
    }

    /// Caller metadata
    pub fn get_metadata(&self) -> PaginatorMetadataMap {
        self.pagination().metadata
    }

    /// Per-key metadata handle
    pub fn metadata(&self) -> PaginatorMetadata<E> {
        PaginatorMetadata::new(self.clone())
    }

    // ========== Writes ==========

    fn ensure_state(&self, txn: &mut StoreTransaction<E>) {
        if txn.partition(&self.inner.name).is_none() {
            self.log("Set Initial State", None);
            txn.set_partition(self.inner.name.clone(), self.initial_state());
        }
    }

    fn update_in(
        &self,
        txn: &mut StoreTransaction<E>,
        f: impl FnOnce(PaginatorState) -> PaginatorState,
    ) {
        self.ensure_state(txn);
        txn.update_partition(&self.inner.name, || self.initial_state(), f);
    }

    fn navigate(&self, target: impl FnOnce(&PaginatorState) -> Option<u32>) {
        self.inner.store.write(|txn| {
            self.ensure_state(txn);
            let Some(state) = txn.partition(&self.inner.name) else {
                return;
            };
            let Some(page) = target(state).map(|page| page.max(1)) else {
                return;
            };
            if state.current_page == page {
                return;
            }
            self.log("Set Page", Some(page));
            self.update_in(txn, |state| state.with_current_page(page));
        });
    }

    /// Move to `page`; no-op if it is already current
    pub fn set_page(&self, page: u32) {
        self.navigate(|_| Some(page));
    }

    /// Move one page forward, staying on the last page
    pub fn next_page(&self) {
        self.navigate(|state| {
            (state.current_page < state.last_page).then(|| state.current_page + 1)
        });
    }

    /// Move one page back, staying on the first page
    pub fn prev_page(&self) {
        self.navigate(|state| (state.current_page > 1).then(|| state.current_page - 1));
    }

    /// Move to page 1
    pub fn set_first_page(&self) {
        self.navigate(|_| Some(1));
    }

    /// Move to the last reported page
    pub fn set_last_page(&self) {
        self.navigate(|state| (state.last_page >= 1).then_some(state.last_page));
    }

    /// Merge a fetch response and return the page it was cached under
    ///
    /// The pagination numbers, the page's identity list and the page's own
    /// entities are written in one transaction. For normalized responses the
    /// other collections are upserted first, through the registry. Every
    /// collection is decoded before anything is written, so a response that
    /// fails to decode leaves all stores untouched.
    pub fn update(&self, response: FetchResponse<E>) -> Result<u32> {
        let info = response.info().clone();
        let data_len = response.data_len();
        let page = info.current_page;

        let (ids, own, foreign) = match response {
            FetchResponse::Raw(raw) => match raw.data {
                PageData::Ids(ids) => (ids, Vec::new(), Vec::new()),
                PageData::Entities(entities) => {
                    (entities.iter().map(Entity::id).collect(), entities, Vec::new())
                }
            },
            FetchResponse::Normalized(normalized) => {
                let own_name = self.inner.store.name();
                let foreign = match &self.inner.registry {
                    Some(registry) => {
                        registry.decode_normalized(&normalized.entities, Some(own_name))?
                    }
                    None => {
                        for name in normalized.entities.keys().filter(|n| n.as_str() != own_name) {
                            warn!(
                                target: "facet::paginator",
                                paginator = %self.inner.name,
                                collection = %name,
                                "No registry configured, skipping collection"
                            );
                        }
                        Vec::new()
                    }
                };

                let own = match normalized.entities.get(own_name) {
                    Some(by_id) => normalized
                        .result
                        .data
                        .iter()
                        .filter_map(|id| by_id.get(&id.as_key()))
                        .map(|value| serde_json::from_value::<E>(value.clone()))
                        .collect::<std::result::Result<Vec<E>, _>>()?,
                    None => Vec::new(),
                };
                if own.is_empty() {
                    trace!(
                        target: "facet::paginator",
                        paginator = %self.inner.name,
                        collection = %own_name,
                        page,
                        "No entities for own collection"
                    );
                }
                (normalized.result.data, own, foreign)
            }
        };

        for pending in foreign {
            pending.apply();
        }
        self.inner.store.write(|txn| {
            txn.upsert_many(own);
            self.log("Update", Some(page));
            self.update_in(txn, |state| state.with_page_info(&info, data_len));
            self.add_page_in(txn, page, ids);
        });
        Ok(page)
    }

    fn add_page_in(&self, txn: &mut StoreTransaction<E>, page: u32, ids: Vec<EntityId>) {
        self.log("Add Page", Some(page));
        self.update_in(txn, |state| state.with_page(page, ids));
    }

    /// Cache `data` as the contents of `page`, upserting inline entities
    pub fn add_page(&self, page: u32, data: PageData<E>) {
        let ids = data.ids();
        let entities = match data {
            PageData::Entities(entities) => entities,
            PageData::Ids(_) => Vec::new(),
        };
        self.inner.store.write(|txn| {
            txn.upsert_many(entities);
            self.add_page_in(txn, page, ids);
        });
    }

    /// Reset pages and pagination numbers, clearing the store if configured
    pub fn clear_cache(&self) {
        self.clear_cache_with(ClearCacheOptions::default());
    }

    /// [`clear_cache`](Self::clear_cache) with per-call options
    ///
    /// The first call after [`destroy`](Self::destroy) only re-arms the
    /// paginator and clears nothing.
    pub fn clear_cache_with(&self, options: ClearCacheOptions) {
        if self.inner.initial.swap(false, Ordering::AcqRel) {
            trace!(target: "facet::paginator", paginator = %self.inner.name, "Clear skipped after destroy");
            return;
        }

        let clear_store = options.clear_store != Some(false)
            && (self.inner.config.read().clear_store_with_cache || options.clear_store == Some(true));

        self.log("Clear Cache", None);
        self.inner.store.write(|txn| {
            if clear_store {
                txn.clear();
            }
            self.log("Set Initial State", None);
            txn.set_partition(self.inner.name.clone(), self.initial_state());
        });
    }

    /// Evict one cached page
    pub fn clear_page(&self, page: u32) {
        self.inner.store.write(|txn| {
            let cached = txn
                .partition(&self.inner.name)
                .map_or(false, |state| state.has_page(page));
            if cached {
                self.log("Clear Page", Some(page));
                self.update_in(txn, |state| state.without_page(page));
            }
        });
    }

    /// Evict every cached page, keeping totals and metadata
    pub fn clear_pages(&self) {
        self.inner.store.write(|txn| {
            let any = txn
                .partition(&self.inner.name)
                .map_or(false, |state| !state.pages.is_empty());
            if any {
                self.log("Clear Pages", None);
                self.update_in(txn, PaginatorState::without_pages);
            }
        });
    }

    /// Evict the current page so that its observers fetch it again
    pub fn refresh_current_page(&self) {
        self.clear_page(self.current_page());
    }

    /// Tear down
    ///
    /// Stops the cache-timeout signal, optionally clears the cache and moves
    /// to a page, then arms the flag that makes the next `clear_cache` a no-op.
    pub fn destroy(&self, options: DestroyOptions) {
        if let Some(task) = self.inner.cache_timeout.lock().take() {
            task.abort();
        }
        if options.clear_cache {
            self.clear_cache();
        }
        if let Some(page) = options.current_page {
            self.set_page(page);
        }
        self.inner.initial.store(true, Ordering::Release);
        self.log("Destroy", None);
    }

    /// Set one metadata entry
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        let (key, value) = (key.into(), value.into());
        self.inner.store.write(|txn| {
            self.log("Set Metadata", None);
            self.update_in(txn, |state| state.with_metadata(key, value));
        });
    }

    // ========== Live reads ==========

    pub(crate) fn select_with<T, F>(&self, project: F) -> BoxStream<'static, T>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(&PaginatorState) -> T + Send + 'static,
    {
        let name = self.inner.name.clone();
        let initial = self.initial_state();
        select_distinct(self.inner.store.watch(), move |snapshot: &Arc<StoreState<E>>| {
            project(snapshot.partition(&name).unwrap_or(&initial))
        })
    }

    /// Live pagination record
    pub fn select_state(&self) -> BoxStream<'static, PaginatorState> {
        self.select_with(PaginatorState::clone)
    }

    /// Live current page number
    pub fn page_changes(&self) -> BoxStream<'static, u32> {
        self.select_with(|state| state.current_page)
    }

    /// Live flag: the current page is not cached yet
    pub fn is_loading(&self) -> BoxStream<'static, bool> {
        self.select_with(|state| !state.has_page(state.current_page))
    }

    /// Live window of `limit` page numbers around the current page
    pub fn select_controls(&self, limit: u32) -> BoxStream<'static, Vec<u32>> {
        self.select_with(move |state| page_window(state.current_page, state.last_page, limit))
    }

    /// Live caller metadata
    pub fn select_metadata(&self) -> BoxStream<'static, PaginatorMetadataMap> {
        self.select_with(|state| state.metadata.clone())
    }

    /// Live rendering of a cached page
    ///
    /// Nothing is emitted while the page is not cached.
    pub fn select_page(&self, page: u32) -> BoxStream<'static, PageResponse<E>> {
        let seed = (self.inner.store.watch(), None::<PageResponse<E>>, false, self.clone());
        stream::unfold(seed, move |(mut rx, mut last, mut primed, this)| async move {
            loop {
                if primed && rx.changed().await.is_err() {
                    return None;
                }
                primed = true;

                let snapshot = Arc::clone(&rx.borrow_and_update());
                let Some((response, missing)) = this.render(&snapshot, page) else {
                    continue;
                };
                if last.as_ref() == Some(&response) {
                    continue;
                }
                this.notify_missing(missing);
                last = Some(response.clone());
                return Some((response, (rx, last, primed, this)));
            }
        })
        .boxed()
    }

    // ========== Page streams ==========

    /// Pages of the current page number, following navigation
    ///
    /// Cached pages are served without fetching; missing ones go through
    /// `fetcher`, throttled. A page change cancels the work for the previous
    /// page. A fetch error is the last item of the stream.
    pub fn get_page(&self, fetcher: impl PageFetcher<E>) -> PageStream<E> {
        PageStream::new(self.clone(), Arc::new(fetcher), true)
    }

    /// Like [`get_page`](Self::get_page), for the page current right now only
    pub fn get_current_page(&self, fetcher: impl PageFetcher<E>) -> PageStream<E> {
        PageStream::new(self.clone(), Arc::new(fetcher), false)
    }

    // ========== Crate internals ==========

    /// Project a cached page through the store
    ///
    /// Returns the rendered page and the identities that did not resolve, or
    /// `None` if the page is not cached.
    pub(crate) fn render(
        &self,
        snapshot: &StoreState<E>,
        page: u32,
    ) -> Option<(PageResponse<E>, Vec<EntityId>)> {
        let state = snapshot.partition(&self.inner.name)?;
        let ids = state.page(page)?;
        let config = self.inner.config.read();

        let mut missing = Vec::new();
        let data = ids
            .ids
            .iter()
            .filter_map(|id| match snapshot.get(id) {
                Some(entity) => Some(PageItem::Entity(entity.clone())),
                None => {
                    missing.push(id.clone());
                    config
                        .placeholders
                        .then(|| PageItem::Placeholder(Placeholder { id: id.clone() }))
                }
            })
            .collect();

        let response = PageResponse {
            current_page: state.current_page,
            per_page: state.per_page,
            last_page: state.last_page,
            total: state.total,
            data,
            from: config.range.then(|| state.from()),
            to: config.range.then(|| state.to()),
            page_controls: config
                .pages_controls
                .then(|| generate_pages(state.total, state.per_page)),
        };
        Some((response, missing))
    }

    /// Hand unresolved identities to the not-found callback, off the caller's path
    pub(crate) fn notify_missing(&self, missing: Vec<EntityId>) {
        if missing.is_empty() {
            return;
        }
        let Some(callback) = self.inner.entity_not_found.clone() else {
            return;
        };
        trace!(target: "facet::paginator", paginator = %self.inner.name, missing = missing.len(), "Entities not found");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { callback(missing) });
            }
            Err(_) => callback(missing),
        }
    }

    /// Book a fetch call
    pub(crate) fn reserve_fetch(&self) -> Reservation {
        self.inner.throttle.lock().reserve()
    }

    /// Hand back a fetch call that was dropped before it ran
    pub(crate) fn release_fetch(&self, reservation: &Reservation) {
        self.inner.throttle.lock().release(reservation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_core::{NormalizedEntities, PageInfo};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        id: i64,
        title: String,
    }

    impl Entity for Post {
        fn id(&self) -> EntityId {
            EntityId::Int(self.id)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Author {
        id: i64,
        name: String,
    }

    impl Entity for Author {
        fn id(&self) -> EntityId {
            EntityId::Int(self.id)
        }
    }

    fn post(id: i64) -> Post {
        Post {
            id,
            title: format!("post {}", id),
        }
    }

    fn posts_page(page: u32, ids: std::ops::RangeInclusive<i64>) -> FetchResponse<Post> {
        FetchResponse::entities(
            PageInfo::new(page, 3, 4).with_total(10),
            ids.map(post).collect(),
        )
    }

    fn paginator(store: &EntityStore<Post>) -> Paginator<Post> {
        Paginator::builder(store.clone()).build().unwrap()
    }

    #[test]
    fn test_generated_names_are_unique() {
        let store = EntityStore::<Post>::new("posts");
        let a = paginator(&store);
        let b = paginator(&store);
        assert!(a.name().starts_with("paginator_"));
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn test_name_clash_on_same_store_rejected() {
        let store = EntityStore::<Post>::new("posts");
        let _first = Paginator::builder(store.clone()).name("feed").build().unwrap();
        let second = Paginator::builder(store.clone()).name("feed").build();
        assert!(matches!(second, Err(Error::InvalidConfig(_))));

        let other = EntityStore::<Post>::new("drafts");
        assert!(Paginator::builder(other).name("feed").build().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let store = EntityStore::<Post>::new("posts");
        assert!(Paginator::builder(store).name("").build().is_err());
    }

    #[test]
    fn test_initial_state_is_lazy() {
        let store = EntityStore::<Post>::new("posts");
        let p = Paginator::builder(store.clone())
            .config(PaginatorConfig {
                start_with: 2,
                ..PaginatorConfig::default()
            })
            .build()
            .unwrap();

        assert_eq!(p.current_page(), 2);
        assert_eq!(store.snapshot().version(), 0);

        // The first navigation creates the partition even without moving
        p.set_page(2);
        assert_eq!(store.snapshot().version(), 1);
        assert_eq!(store.partition(p.name()).map(|s| s.current_page), Some(2));
    }

    #[test]
    fn test_navigation_is_idempotent() {
        let store = EntityStore::<Post>::new("posts");
        let p = paginator(&store);
        p.set_page(3);
        let version = store.snapshot().version();

        p.set_page(3);
        p.set_first_page();
        p.set_page(3);
        assert_eq!(store.snapshot().version(), version + 2);

        let version = store.snapshot().version();
        p.set_page(3);
        assert_eq!(store.snapshot().version(), version);
    }

    #[test]
    fn test_next_prev_clamped() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);
        p.update(posts_page(1, 1..=3)).unwrap();

        p.prev_page();
        assert_eq!(p.current_page(), 1);
        assert!(p.is_first());

        p.next_page();
        p.next_page();
        p.next_page();
        assert_eq!(p.current_page(), 4);
        assert!(p.is_last());

        let version = store.snapshot().version();
        p.next_page();
        assert_eq!(p.current_page(), 4);
        assert_eq!(store.snapshot().version(), version);

        p.set_first_page();
        assert_eq!(p.current_page(), 1);
        p.set_last_page();
        assert_eq!(p.current_page(), 4);
        assert!(p.is_page_active(4));
    }

    #[test]
    fn test_update_records_page_and_entities_in_one_commit() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);

        let cached = p.update(posts_page(2, 4..=6)).unwrap();
        assert_eq!(cached, 2);
        assert_eq!(store.snapshot().version(), 1);

        let state = p.pagination();
        assert_eq!(state.current_page, 2);
        assert_eq!(state.per_page, 3);
        assert_eq!(state.last_page, 4);
        assert_eq!(state.total, 10);
        assert_eq!(
            state.page(2).map(|ids| ids.ids.clone()),
            Some(vec![EntityId::from(4i64), EntityId::from(5i64), EntityId::from(6i64)])
        );
        assert_eq!(store.len(), 3);
        assert!(p.has_page(2));
        assert!(!p.has_page(1));
    }

    #[test]
    fn test_total_inferred() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);

        p.update(FetchResponse::entities(PageInfo::new(1, 10, 1), vec![post(1), post(2)]))
            .unwrap();
        assert_eq!(p.pagination().total, 2);

        p.update(FetchResponse::ids(
            PageInfo::new(2, 10, 5),
            vec![EntityId::from(11i64)],
        ))
        .unwrap();
        assert_eq!(p.pagination().total, 50);
    }

    #[test]
    fn test_ids_only_response_caches_page() {
        let store = EntityStore::<Post>::new("posts");
        let p = paginator(&store);
        p.update(FetchResponse::ids(
            PageInfo::new(1, 2, 1),
            vec![EntityId::from(1i64), EntityId::from(2i64)],
        ))
        .unwrap();

        assert!(p.has_page(1));
        assert!(store.is_empty());
    }

    fn normalized_payload() -> NormalizedEntities {
        let mut posts = BTreeMap::new();
        posts.insert("1".to_string(), json!({"id": 1, "title": "hello"}));
        posts.insert("9".to_string(), json!({"id": 9, "title": "not on page"}));
        let mut authors = BTreeMap::new();
        authors.insert("7".to_string(), json!({"id": 7, "name": "ada"}));
        let mut comments = BTreeMap::new();
        comments.insert("3".to_string(), json!({"id": 3}));

        let mut entities = BTreeMap::new();
        entities.insert("posts".to_string(), posts);
        entities.insert("authors".to_string(), authors);
        entities.insert("comments".to_string(), comments);
        entities
    }

    #[test]
    fn test_normalized_update_routes_collections() {
        let posts = EntityStore::<Post>::new("posts");
        let authors = EntityStore::<Author>::new("authors");
        let registry = StoreRegistry::new()
            .register(posts.clone())
            .and_then(|r| r.register(authors.clone()))
            .unwrap();
        let p = Paginator::builder(posts.clone())
            .registry(registry)
            .build()
            .unwrap();

        p.update(FetchResponse::normalized(
            PageInfo::new(1, 2, 1),
            vec![EntityId::from(1i64), EntityId::from(2i64)],
            normalized_payload(),
        ))
        .unwrap();

        assert_eq!(posts.ids(), vec![EntityId::from(1i64)]);
        assert_eq!(authors.len(), 1);
        assert_eq!(p.pagination().total, 2);
    }

    #[test]
    fn test_malformed_own_entity_writes_nothing() {
        let posts = EntityStore::<Post>::new("posts");
        let authors = EntityStore::<Author>::new("authors");
        let registry = StoreRegistry::new()
            .register(posts.clone())
            .and_then(|r| r.register(authors.clone()))
            .unwrap();
        let p = Paginator::builder(posts.clone())
            .registry(registry)
            .build()
            .unwrap();

        let mut payload = BTreeMap::new();
        payload.insert(
            "authors".to_string(),
            BTreeMap::from([("9".to_string(), json!({"id": 9, "name": "ada"}))]),
        );
        // post without a title
        payload.insert(
            "posts".to_string(),
            BTreeMap::from([("1".to_string(), json!({"id": 1}))]),
        );

        let result = p.update(FetchResponse::normalized(
            PageInfo::new(1, 2, 1),
            vec![EntityId::from(1i64)],
            payload,
        ));

        assert!(matches!(result, Err(Error::Serialization(_))));
        assert!(authors.is_empty());
        assert!(posts.is_empty());
        assert!(!p.has_page(1));
    }

    #[test]
    fn test_malformed_foreign_entity_writes_nothing() {
        let posts = EntityStore::<Post>::new("posts");
        let authors = EntityStore::<Author>::new("authors");
        let registry = StoreRegistry::new()
            .register(posts.clone())
            .and_then(|r| r.register(authors.clone()))
            .unwrap();
        let p = Paginator::builder(posts.clone())
            .registry(registry)
            .build()
            .unwrap();

        let mut payload = BTreeMap::new();
        payload.insert(
            "authors".to_string(),
            BTreeMap::from([("9".to_string(), json!({"id": "nine"}))]),
        );
        payload.insert(
            "posts".to_string(),
            BTreeMap::from([("1".to_string(), json!({"id": 1, "title": "one"}))]),
        );

        let result = p.update(FetchResponse::normalized(
            PageInfo::new(1, 2, 1),
            vec![EntityId::from(1i64)],
            payload,
        ));

        assert!(result.is_err());
        assert!(authors.is_empty());
        assert!(posts.is_empty());
        assert!(!p.has_page(1));
    }

    #[test]
    fn test_render_with_placeholders() {
        let store = EntityStore::<Post>::new("posts");
        let p = paginator(&store);
        store.upsert(post(1));
        p.add_page(
            1,
            PageData::Ids(vec![EntityId::from(1i64), EntityId::from(2i64)]),
        );

        let (page, missing) = p.render(&store.snapshot(), 1).unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.placeholders().collect::<Vec<_>>(), vec![&EntityId::from(2i64)]);
        assert_eq!(missing, vec![EntityId::from(2i64)]);
    }

    #[test]
    fn test_render_keeps_placeholder_in_position() {
        let store = EntityStore::<Post>::new("posts");
        let p = paginator(&store);
        store.upsert_many(vec![post(10), post(12)]);
        p.add_page(
            1,
            PageData::Ids(vec![
                EntityId::from(10i64),
                EntityId::from(11i64),
                EntityId::from(12i64),
            ]),
        );

        let (page, missing) = p.render(&store.snapshot(), 1).unwrap();
        assert_eq!(
            page.data,
            vec![
                PageItem::Entity(post(10)),
                PageItem::Placeholder(Placeholder {
                    id: EntityId::from(11i64)
                }),
                PageItem::Entity(post(12)),
            ]
        );
        assert_eq!(missing, vec![EntityId::from(11i64)]);
    }

    #[test]
    fn test_render_without_placeholders() {
        let store = EntityStore::<Post>::new("posts");
        let p = Paginator::builder(store.clone())
            .placeholders(false)
            .build()
            .unwrap();
        store.upsert(post(1));
        p.add_page(
            1,
            PageData::Ids(vec![EntityId::from(1i64), EntityId::from(2i64)]),
        );

        let (page, missing) = p.render(&store.snapshot(), 1).unwrap();
        assert_eq!(page.entities().collect::<Vec<_>>(), vec![&post(1)]);
        assert_eq!(page.data.len(), 1);
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn test_render_range_and_controls() {
        let store = EntityStore::new("posts");
        let p = paginator(&store).with_range().with_controls();
        p.update(posts_page(2, 4..=6)).unwrap();

        let (page, _) = p.render(&store.snapshot(), 2).unwrap();
        assert_eq!(page.from, Some(4));
        assert_eq!(page.to, Some(6));
        assert_eq!(page.page_controls, Some(vec![1, 2, 3, 4]));

        p.update(posts_page(4, 10..=10)).unwrap();
        let (page, _) = p.render(&store.snapshot(), 4).unwrap();
        assert_eq!(page.to, Some(10));
    }

    #[test]
    fn test_render_uncached_page_is_none() {
        let store = EntityStore::<Post>::new("posts");
        let p = paginator(&store);
        assert!(p.render(&store.snapshot(), 1).is_none());
    }

    #[test]
    fn test_clear_cache_resets_and_clears_store() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);
        p.update(posts_page(2, 4..=6)).unwrap();
        p.set_metadata("filter", "all");

        p.clear_cache();
        assert_eq!(p.pagination(), PaginatorState::initial(1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_cache_store_override() {
        let store = EntityStore::new("posts");
        let p = Paginator::builder(store.clone())
            .config(PaginatorConfig {
                clear_store_with_cache: false,
                ..PaginatorConfig::default()
            })
            .build()
            .unwrap();

        p.update(posts_page(1, 1..=3)).unwrap();
        p.clear_cache();
        assert_eq!(store.len(), 3);
        assert!(!p.has_page(1));

        p.update(posts_page(1, 1..=3)).unwrap();
        p.clear_cache_with(ClearCacheOptions {
            clear_store: Some(true),
        });
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_cache_after_destroy_is_skipped_once() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);
        p.update(posts_page(1, 1..=3)).unwrap();

        p.destroy(DestroyOptions::default());
        p.clear_cache();
        assert!(p.has_page(1));

        p.clear_cache();
        assert!(!p.has_page(1));
    }

    #[test]
    fn test_destroy_with_options() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);
        p.update(posts_page(1, 1..=3)).unwrap();

        p.destroy(DestroyOptions {
            clear_cache: true,
            current_page: Some(3),
        });
        assert!(!p.has_page(1));
        assert_eq!(p.current_page(), 3);
    }

    #[test]
    fn test_clear_page_and_pages() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);
        p.update(posts_page(1, 1..=3)).unwrap();
        p.update(posts_page(2, 4..=6)).unwrap();

        p.clear_page(1);
        assert!(!p.has_page(1));
        assert!(p.has_page(2));

        let version = store.snapshot().version();
        p.clear_page(1);
        assert_eq!(store.snapshot().version(), version);

        p.clear_pages();
        assert!(!p.has_page(2));
        assert_eq!(p.pagination().total, 10);
    }

    #[test]
    fn test_refresh_current_page() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);
        p.update(posts_page(2, 4..=6)).unwrap();
        p.refresh_current_page();
        assert!(!p.has_page(2));
        assert_eq!(p.current_page(), 2);
    }

    #[test]
    fn test_metadata() {
        let store = EntityStore::<Post>::new("posts");
        let p = paginator(&store);
        p.set_metadata("sort", "desc");
        assert_eq!(p.get_metadata().get("sort"), Some(&json!("desc")));
        assert_eq!(p.metadata().get("sort"), Some(json!("desc")));
        p.metadata().set("limit", 5);
        assert_eq!(p.metadata().get("limit"), Some(json!(5)));
    }

    #[tokio::test]
    async fn test_select_controls_follows_page() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);
        p.update(FetchResponse::entities(PageInfo::new(1, 1, 10), vec![post(1)]))
            .unwrap();

        let mut controls = p.select_controls(5);
        assert_eq!(controls.next().await, Some(vec![1, 2, 3, 4, 5]));
        p.set_page(6);
        assert_eq!(controls.next().await, Some(vec![4, 5, 6, 7, 8]));
        p.set_last_page();
        assert_eq!(controls.next().await, Some(vec![6, 7, 8, 9, 10]));
    }

    #[tokio::test]
    async fn test_is_loading_and_page_changes() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);
        let mut loading = p.is_loading();
        let mut pages = p.page_changes();

        assert_eq!(loading.next().await, Some(true));
        assert_eq!(pages.next().await, Some(1));

        p.update(posts_page(1, 1..=3)).unwrap();
        assert_eq!(loading.next().await, Some(false));

        p.set_page(2);
        assert_eq!(pages.next().await, Some(2));
        assert_eq!(loading.next().await, Some(true));
    }

    #[tokio::test]
    async fn test_select_page_waits_for_cache_and_rerenders() {
        let store = EntityStore::new("posts");
        let p = paginator(&store);
        let mut page = p.select_page(1);

        p.add_page(1, PageData::Entities(vec![post(1)]));
        let first = page.next().await.unwrap();
        assert_eq!(first.entities().count(), 1);

        store.update(&EntityId::from(1i64), |post| post.title = "edited".into());
        let second = page.next().await.unwrap();
        assert_eq!(second.entities().next().map(|p| p.title.as_str()), Some("edited"));
    }

    #[tokio::test]
    async fn test_cache_timeout_clears() {
        let store = EntityStore::new("posts");
        let (tx, rx) = futures::channel::mpsc::unbounded::<()>();
        let p = Paginator::builder(store.clone())
            .cache_timeout(rx)
            .build()
            .unwrap();
        p.update(posts_page(1, 1..=3)).unwrap();

        let mut states = p.select_state();
        assert!(states.next().await.unwrap().has_page(1));

        tx.unbounded_send(()).unwrap();
        let cleared = states.next().await.unwrap();
        assert!(!cleared.has_page(1));
    }

    #[test]
    fn test_cache_timeout_needs_runtime() {
        let store = EntityStore::<Post>::new("posts");
        let result = Paginator::builder(store)
            .cache_timeout(futures::stream::pending::<()>())
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
