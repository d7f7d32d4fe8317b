//! Timing operators used by the page stream
//!
//! - `LeadingDebounce`: first value passes at once, bursts settle to the last value
//! - `FetchThrottle`: spaces fetch calls up to one window apart, never drops one

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

/// Leading-edge debounce over a projection of watched state
///
/// `next` is cancel-safe: a change observed by a dropped `next` future is
/// not lost, the following call settles it.
pub struct LeadingDebounce<S, T, F> {
    rx: watch::Receiver<S>,
    project: F,
    window: Duration,
    last: Option<T>,
    pending: bool,
}

impl<S, T, F> LeadingDebounce<S, T, F>
where
    T: Clone + PartialEq,
    F: Fn(&S) -> T,
{
    /// Debounce `project(rx)` with an idle `window`
    pub fn new(rx: watch::Receiver<S>, window: Duration, project: F) -> Self {
        Self {
            rx,
            project,
            window,
            last: None,
            pending: false,
        }
    }

    /// Most recently emitted value
    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Next distinct value; `None` once the watched state is gone
    pub async fn next(&mut self) -> Option<T> {
        loop {
            if self.last.is_some() {
                if !self.pending {
                    self.rx.changed().await.ok()?;
                    self.pending = true;
                }
                self.settle().await;
            }

            self.pending = false;
            let value = (self.project)(&self.rx.borrow_and_update());
            if self.last.as_ref() != Some(&value) {
                self.last = Some(value.clone());
                return Some(value);
            }
        }
    }

    /// Wait until no change arrives for one window
    async fn settle(&mut self) {
        if self.window.is_zero() {
            return;
        }
        loop {
            tokio::select! {
                _ = sleep(self.window) => return,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Minimum spacing between fetch calls
///
/// A delay never exceeds one window. A reservation whose call never started
/// can be handed back with [`release`](FetchThrottle::release).
#[derive(Debug, Clone)]
pub struct FetchThrottle {
    window: Duration,
    last_call: Option<Instant>,
}

/// One booked fetch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    delay: Duration,
    at: Instant,
    previous: Option<Instant>,
}

impl Reservation {
    /// How long to wait before making the call
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl FetchThrottle {
    /// Throttle with the given window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_call: None,
        }
    }

    /// Book the next fetch call
    ///
    /// The call waits for whatever remains of the window opened by the last
    /// booked call, and at most one window.
    pub fn reserve(&mut self) -> Reservation {
        let now = Instant::now();
        let delay = match self.last_call {
            Some(last) => self
                .window
                .saturating_sub(now.saturating_duration_since(last))
                .min(self.window),
            None => Duration::ZERO,
        };
        let reservation = Reservation {
            delay,
            at: now + delay,
            previous: self.last_call,
        };
        self.last_call = Some(reservation.at);
        reservation
    }

    /// Hand back a reservation whose call was dropped before it ran
    ///
    /// No-op once the call time has passed or a later call was booked.
    pub fn release(&mut self, reservation: &Reservation) {
        if self.last_call == Some(reservation.at) && Instant::now() < reservation.at {
            self.last_call = reservation.previous;
        }
    }
}
