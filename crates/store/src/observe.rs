//! Live, duplicate-suppressing streams over watched state
//!
//! Every `select*` method in facet is a projection of a `watch` channel: the
//! projection runs once immediately, then again after every change, and a value
//! is only yielded when it differs from the previous one.

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

/// Project watched state into a stream of distinct values
///
/// The current value is always yielded first, even if it is "empty". The
/// stream ends when the sender side of the channel is dropped.
pub fn select_distinct<S, T, F>(rx: watch::Receiver<S>, project: F) -> BoxStream<'static, T>
where
    S: Send + Sync + 'static,
    T: Clone + PartialEq + Send + 'static,
    F: Fn(&S) -> T + Send + 'static,
{
    stream::unfold(
        (rx, None::<T>, project),
        |(mut rx, last, project)| async move {
            loop {
                if last.is_some() && rx.changed().await.is_err() {
                    return None;
                }
                let value = project(&rx.borrow_and_update());
                if last.as_ref() != Some(&value) {
                    return Some((value.clone(), (rx, Some(value), project)));
                }
            }
        },
    )
    .boxed()
}
