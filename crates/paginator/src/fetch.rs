//! Page fetch functions

use facet_core::{FetchResponse, Result};
use futures::future::BoxFuture;
use std::future::Future;

/// Source of pages
///
/// Any `Fn(u32) -> impl Future<Output = Result<FetchResponse<E>>>` closure is
/// a fetcher:
///
/// ```rust,ignore
/// let stream = paginator.get_page(|page| async move {
///     api.list_posts(page).await.map_err(Error::fetch)
/// });
/// ```
pub trait PageFetcher<E>: Send + Sync + 'static {
    /// Fetch one page
    fn fetch(&self, page: u32) -> BoxFuture<'static, Result<FetchResponse<E>>>;
}

impl<E, F, Fut> PageFetcher<E> for F
where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<FetchResponse<E>>> + Send + 'static,
{
    fn fetch(&self, page: u32) -> BoxFuture<'static, Result<FetchResponse<E>>> {
        Box::pin(self(page))
    }
}
