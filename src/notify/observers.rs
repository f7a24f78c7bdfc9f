//! Observer registry and change events
//!
//! Observers are plain callbacks. Each delivery runs them one after another
//! on the debounce task, isolated with `catch_unwind` so a panicking observer
//! cannot starve the rest. A broadcast channel mirrors every event for async
//! consumers.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::error;

use super::lock;

/// Buffered events per channel subscriber before it starts lagging
const CHANGE_CHANNEL_CAPACITY: usize = 64;

// == Change Event ==
/// Signal delivered once per debounce window that saw mutations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// Name of the cache instance that changed
    pub cache: String,
    /// Per-cache notification counter, starting at 1
    pub sequence: u64,
    /// Mutations coalesced into this notification
    pub mutations: u64,
    /// Wall-clock time the notification fired
    pub fired_at: DateTime<Utc>,
}

pub type Observer = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

// == Observer Registry ==
pub(crate) struct ObserverRegistry {
    observers: Mutex<Vec<(u64, Observer)>>,
    next_id: AtomicU64,
    channel: broadcast::Sender<ChangeEvent>,
}

impl ObserverRegistry {
    pub(crate) fn new() -> Self {
        let (channel, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            channel,
        }
    }

    // == Register ==
    /// Adds an observer and returns the token that removes it.
    pub(crate) fn register(self: &Arc<Self>, observer: Observer) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.observers).push((id, observer));
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.observers).len()
    }

    pub(crate) fn channel(&self) -> broadcast::Receiver<ChangeEvent> {
        self.channel.subscribe()
    }

    // == Deliver ==
    /// Invokes every observer with `event`, then publishes it on the channel.
    ///
    /// The observer list is snapshotted first, so observers may subscribe or
    /// unsubscribe from inside their callback. Returns how many observers
    /// completed without panicking.
    pub(crate) fn deliver(&self, event: &ChangeEvent) -> usize {
        let snapshot: Vec<(u64, Observer)> = lock(&self.observers).clone();

        let mut delivered = 0;
        for (id, observer) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| (*observer)(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => error!(
                    "Observer {} of cache '{}' panicked: {}",
                    id,
                    event.cache,
                    panic_message(panic.as_ref())
                ),
            }
        }

        // No receivers is fine
        let _ = self.channel.send(event.clone());
        delivered
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

// == Subscription ==
/// Token returned by `subscribe`; call [`Subscription::unsubscribe`] to stop
/// receiving notifications.
///
/// Dropping the token does not unsubscribe.
pub struct Subscription {
    id: u64,
    registry: Weak<ObserverRegistry>,
}

impl Subscription {
    /// Identifier unique within the owning cache.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deregisters the observer. Returns false if it was already gone, for
    /// instance because the cache has been dropped.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| registry.remove(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &(self.registry.strong_count() > 0))
            .finish()
    }
}
