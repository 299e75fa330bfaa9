//! Observer lists and the session teardown broadcast.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifies one subscription in an [`ObserverList`].
pub type SubscriptionId = u64;

/// Something that must let go of native resources when its session ends.
pub trait TeardownListener: Send + Sync {
    fn on_teardown(&self);
}

/// Thread-safe list of subscribers that can be closed exactly once.
///
/// Once closed, the remaining subscribers are handed to the closer and every
/// later `subscribe` is refused.
pub struct ObserverList<T: ?Sized> {
    next_id: AtomicU64,
    inner: Mutex<Observers<T>>,
}

struct Observers<T: ?Sized> {
    closed: bool,
    entries: Vec<(SubscriptionId, Arc<T>)>,
}

impl<T: ?Sized> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inner: Mutex::new(Observers {
                closed: false,
                entries: Vec::new(),
            }),
        }
    }
}

impl<T: ?Sized> ObserverList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `None` if the list is closed.
    pub fn subscribe(&self, observer: Arc<T>) -> Option<SubscriptionId> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        inner.entries.push((id, observer));
        Some(id)
    }

    /// Remove a subscriber. Returns whether it was present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(entry, _)| *entry != id);
        inner.entries.len() != before
    }

    /// Current subscribers in subscription order, for calling outside the lock.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    /// Close the list and take its subscribers. `None` if it was already closed.
    pub fn close(&self) -> Option<Vec<Arc<T>>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.closed = true;
        Some(
            std::mem::take(&mut inner.entries)
                .into_iter()
                .map(|(_, observer)| observer)
                .collect(),
        )
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The per-session "dispose everything" signal.
#[derive(Default)]
pub(crate) struct Teardown {
    listeners: ObserverList<dyn TeardownListener>,
}

impl Teardown {
    pub(crate) fn subscribe(&self, listener: Arc<dyn TeardownListener>) -> Option<SubscriptionId> {
        self.listeners.subscribe(listener)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.listeners.is_closed()
    }

    pub(crate) fn live_listeners(&self) -> usize {
        self.listeners.len()
    }

    /// Notify every listener once. Later calls do nothing and return 0.
    pub(crate) fn broadcast(&self) -> usize {
        let Some(listeners) = self.listeners.close() else {
            return 0;
        };
        let count = listeners.len();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_teardown())).is_err() {
                tracing::warn!("teardown listener panicked, continuing");
            }
        }
        count
    }
}
