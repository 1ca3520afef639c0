// ── Latest-value subscriptions ──
//
// Each coordinator publishes its synchronized value into a watch channel.
// Subscribers get the current value plus a notification per broadcast.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// The last broadcast value. `value` is `None` while nothing is held.
#[derive(Debug)]
pub struct Latest<T> {
    /// Bumped on every broadcast.
    pub revision: u64,
    pub value: Option<Arc<T>>,
}

// Manual impls: `T` itself need not be `Clone`.
impl<T> Clone for Latest<T> {
    fn clone(&self) -> Self {
        Self {
            revision: self.revision,
            value: self.value.clone(),
        }
    }
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self {
            revision: 0,
            value: None,
        }
    }
}

impl<T> Latest<T> {
    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }
}

/// A subscription to one coordinator's value.
///
/// Provides both point-in-time access and change notification via
/// [`changed`](Self::changed) or by converting to a `Stream`.
pub struct StateStream<T: Send + Sync + 'static> {
    current: Latest<T>,
    receiver: watch::Receiver<Latest<T>>,
}

impl<T: Send + Sync + 'static> StateStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Latest<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The value captured at creation (or at the last `changed`).
    pub fn current(&self) -> &Latest<T> {
        &self.current
    }

    /// The value right now.
    pub fn latest(&self) -> Latest<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next broadcast.
    /// Returns `None` once the coordinator is gone.
    pub async fn changed(&mut self) -> Option<Latest<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// An independent subscription to the same value.
    pub fn resubscribe(&self) -> Self {
        Self::new(self.receiver.clone())
    }

    pub fn into_stream(self) -> StateWatchStream<T> {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding every broadcast, starting with the current one.
pub struct StateWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Latest<T>>,
}

impl<T: Send + Sync + 'static> Stream for StateWatchStream<T> {
    type Item = Latest<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
