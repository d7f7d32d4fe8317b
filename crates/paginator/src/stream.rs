//! Page streams
//!
//! A [`PageStream`] owns a driver task that, per page number:
//!
//! 1. serves the page from cache, or books a throttled fetch and merges the
//!    response into the store,
//! 2. renders the page on every store change, skipping unchanged renders,
//! 3. fetches again if the page is evicted while it is still current.
//!
//! In follow mode the driver listens to page changes (debounced) and drops
//! the work for the previous page, including an in-flight fetch.

use crate::fetch::PageFetcher;
use crate::operators::LeadingDebounce;
use crate::paginator::Paginator;
use facet_core::{Entity, PageResponse, Result};
use facet_store::StoreState;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{trace, warn};

/// Stream of rendered pages
///
/// The driver task is spawned on the first poll, which must happen inside a
/// tokio runtime. Dropping the stream aborts the driver.
pub struct PageStream<E: Entity> {
    rx: mpsc::Receiver<Result<PageResponse<E>>>,
    driver: Option<BoxFuture<'static, ()>>,
    task: Option<JoinHandle<()>>,
}

impl<E: Entity> PageStream<E> {
    pub(crate) fn new(
        paginator: Paginator<E>,
        fetcher: Arc<dyn PageFetcher<E>>,
        follow: bool,
    ) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let driver = Driver {
            paginator,
            fetcher,
            follow,
            tx,
            last: None,
        };
        Self {
            rx,
            driver: Some(driver.run().boxed()),
            task: None,
        }
    }
}

impl<E: Entity> Stream for PageStream<E> {
    type Item = Result<PageResponse<E>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(driver) = self.driver.take() {
            self.task = Some(tokio::spawn(driver));
        }
        self.rx.poll_next_unpin(cx)
    }
}

impl<E: Entity> Drop for PageStream<E> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum Step {
    Load(u32),
    Project(u32),
    Done,
}

type PageSource<E, F> = LeadingDebounce<Arc<StoreState<E>>, u32, F>;

struct Driver<E: Entity> {
    paginator: Paginator<E>,
    fetcher: Arc<dyn PageFetcher<E>>,
    follow: bool,
    tx: mpsc::Sender<Result<PageResponse<E>>>,
    last: Option<PageResponse<E>>,
}

impl<E: Entity> Driver<E> {
    async fn run(mut self) {
        let config = self.paginator.config();
        let name = self.paginator.name().to_string();
        let start = config.start_with;
        let mut pages = LeadingDebounce::new(
            self.paginator.store().watch(),
            config.debounce(),
            move |snapshot: &Arc<StoreState<E>>| {
                snapshot
                    .partition(&name)
                    .map_or(start, |state| state.current_page)
            },
        );

        let Some(first) = pages.next().await else {
            return;
        };
        let mut step = Step::Load(first);
        loop {
            step = match step {
                Step::Load(page) => self.load(page, &mut pages).await,
                Step::Project(page) => self.project(page, &mut pages).await,
                Step::Done => return,
            };
        }
    }

    /// Make sure `page` is cached, fetching it if needed
    async fn load<F>(&mut self, page: u32, pages: &mut PageSource<E, F>) -> Step
    where
        F: Fn(&Arc<StoreState<E>>) -> u32,
    {
        if self.paginator.has_page(page) {
            trace!(target: "facet::paginator", paginator = %self.paginator.name(), page, "Page served from cache");
            return Step::Project(page);
        }

        let reservation = self.paginator.reserve_fetch();
        let delay = reservation.delay();
        trace!(target: "facet::paginator", paginator = %self.paginator.name(), page, delay_ms = delay.as_millis() as u64, "Fetching page");
        let _loading = self.paginator.store().loading_guard();
        let fetcher = Arc::clone(&self.fetcher);
        let fetch = async move {
            sleep(delay).await;
            fetcher.fetch(page).await
        };

        let result = if self.follow {
            tokio::select! {
                result = fetch => result,
                next = pages.next() => {
                    self.paginator.release_fetch(&reservation);
                    trace!(target: "facet::paginator", paginator = %self.paginator.name(), page, "Fetch dropped by page change");
                    return match next {
                        Some(next) => Step::Load(next),
                        None => Step::Done,
                    };
                }
            }
        } else {
            fetch.await
        };

        match result.and_then(|response| self.paginator.update(response)) {
            Ok(cached) => Step::Project(cached),
            Err(err) => {
                warn!(target: "facet::paginator", paginator = %self.paginator.name(), page, error = %err, "Page fetch failed");
                let _ = self.tx.send(Err(err)).await;
                Step::Done
            }
        }
    }

    /// Emit renders of a cached page until it goes away or the page changes
    async fn project<F>(&mut self, page: u32, pages: &mut PageSource<E, F>) -> Step
    where
        F: Fn(&Arc<StoreState<E>>) -> u32,
    {
        let mut rx = self.paginator.store().watch();
        loop {
            let snapshot = Arc::clone(&rx.borrow_and_update());
            let current = self.paginator.state_of(&snapshot).current_page;
            let rendered = if self.follow && current != page {
                // navigation pending
                None
            } else {
                self.paginator.render(&snapshot, page)
            };
            match rendered {
                Some((response, missing)) => {
                    if self.last.as_ref() != Some(&response) {
                        self.paginator.notify_missing(missing);
                        self.last = Some(response.clone());
                        if self.tx.send(Ok(response)).await.is_err() {
                            return Step::Done;
                        }
                    }
                }
                None if current == page => {
                    trace!(target: "facet::paginator", paginator = %self.paginator.name(), page, "Current page evicted");
                    return Step::Load(page);
                }
                None => {}
            }

            if self.follow {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return Step::Done;
                        }
                    }
                    next = pages.next() => {
                        return match next {
                            Some(next) => Step::Load(next),
                            None => Step::Done,
                        };
                    }
                }
            } else if rx.changed().await.is_err() {
                return Step::Done;
            }
        }
    }
}
