//! Notifying Cache Handle
//!
//! Shared access path to one named cache instance.

use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use super::debounce::Debouncer;
use super::lock;
use super::observers::{ChangeEvent, ObserverRegistry, Subscription};
use crate::cache::{BoundedCache, CacheStats};
use crate::error::Result;

struct Shared<K, V> {
    name: String,
    cache: Mutex<BoundedCache<K, V>>,
    observers: Arc<ObserverRegistry>,
    debouncer: Debouncer,
}

// == Notifying Cache Handle ==
/// Thread-safe handle to a [`BoundedCache`] that notifies observers after
/// mutations.
///
/// Reads never notify. Every `set`, `delete` and `clear` (re)starts a
/// debounce timer of length `debounce_window`; observers run once the timer
/// elapses without another mutation, receiving a single [`ChangeEvent`] that
/// covers every mutation in the window.
///
/// # Liveness
/// The timer resets on every mutation. A stream of mutations spaced closer
/// than the window suppresses notification until a gap of at least one
/// window occurs.
///
/// Clones share the same cache. The cache and any pending notification are
/// dropped with the last clone.
pub struct NotifyingCacheHandle<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for NotifyingCacheHandle<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> fmt::Debug for NotifyingCacheHandle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyingCacheHandle")
            .field("name", &self.shared.name)
            .field("debounce_window", &self.shared.debouncer.window())
            .finish_non_exhaustive()
    }
}

impl<K, V> NotifyingCacheHandle<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Takes ownership of `cache` and starts its debounce timer on the
    /// current Tokio runtime.
    ///
    /// # Errors
    /// - `CacheError::InvalidDebounceWindow` when `debounce_window` is zero or
    ///   too long to schedule
    /// - `CacheError::RuntimeUnavailable` outside a Tokio runtime
    pub fn new(
        name: impl Into<String>,
        cache: BoundedCache<K, V>,
        debounce_window: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let observers = Arc::new(ObserverRegistry::new());
        let debouncer = Debouncer::spawn(name.clone(), debounce_window, observers.clone())?;

        debug!(
            "Cache '{}' ready: capacity={}, default_ttl={:?}, debounce={:?}",
            name,
            cache.capacity(),
            cache.default_ttl(),
            debounce_window
        );

        Ok(Self {
            shared: Arc::new(Shared {
                name,
                cache: Mutex::new(cache),
                observers,
                debouncer,
            }),
        })
    }

    // == Name ==
    /// Instance name carried on every [`ChangeEvent`].
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Quiet period after which a pending notification fires.
    pub fn debounce_window(&self) -> Duration {
        self.shared.debouncer.window()
    }

    // == Reads ==
    /// Returns a live value and promotes it. Never notifies.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        lock(&self.shared.cache).get(key)
    }

    /// Returns a live value without promoting it.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        lock(&self.shared.cache).peek(key).cloned()
    }

    /// True if `key` holds a live entry. Does not promote.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        lock(&self.shared.cache).contains_key(key)
    }

    /// Remaining time-to-live of a live entry, None without a TTL.
    pub fn ttl_remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        lock(&self.shared.cache).ttl_remaining(key)
    }

    // == Mutations ==
    /// Inserts or replaces an entry, then schedules a notification.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        lock(&self.shared.cache).set(key, value, ttl);
        self.shared.debouncer.mark();
    }

    /// Removes an entry, then schedules a notification.
    ///
    /// Returns true if an entry was removed.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = lock(&self.shared.cache).delete(key);
        self.shared.debouncer.mark();
        removed
    }

    /// Removes every entry, then schedules a notification.
    pub fn clear(&self) -> usize {
        let removed = lock(&self.shared.cache).clear();
        self.shared.debouncer.mark();
        removed
    }

    /// Drops expired entries. Not a logical change, so observers are not
    /// notified.
    pub fn purge_expired(&self) -> usize {
        lock(&self.shared.cache).purge_expired()
    }

    // == Memoizing Fetch ==
    /// Returns the cached value for `key`, or awaits `fetch`, caches its
    /// result and returns it.
    ///
    /// Fetch errors are returned as-is and nothing is cached. The cache lock
    /// is not held while `fetch` runs, so concurrent misses on the same key
    /// may each fetch; the last write wins.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: K,
        ttl: Option<Duration>,
        fetch: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let value = fetch().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    // == Inspection ==
    /// Entry count, including expired entries not yet purged.
    pub fn len(&self) -> usize {
        lock(&self.shared.cache).len()
    }

    /// Number of unexpired entries.
    pub fn live_len(&self) -> usize {
        lock(&self.shared.cache).live_len()
    }

    /// Returns true if no entries are held.
    pub fn is_empty(&self) -> bool {
        lock(&self.shared.cache).is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        lock(&self.shared.cache).capacity()
    }

    /// TTL applied to writes that do not specify one.
    pub fn default_ttl(&self) -> Option<Duration> {
        lock(&self.shared.cache).default_ttl()
    }

    /// Live keys, most recently used first.
    pub fn keys(&self) -> Vec<K> {
        lock(&self.shared.cache).keys()
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        lock(&self.shared.cache).stats()
    }

    /// True while a notification is scheduled but has not fired yet.
    pub fn is_notification_pending(&self) -> bool {
        self.shared.debouncer.is_pending()
    }

    // == Subscriptions ==
    /// Registers an observer invoked once per debounce window that saw at
    /// least one mutation.
    ///
    /// Observers run on the debounce task, never while the cache lock is
    /// held, so they may read or write this cache. A panicking observer is
    /// logged and skipped.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.shared.observers.register(Arc::new(observer))
    }

    /// Channel receiving the same events as observers.
    pub fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.shared.observers.channel()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.shared.observers.len()
    }

    /// Non-owning reference for background tasks that must not keep the
    /// cache alive.
    pub fn downgrade(&self) -> WeakCacheHandle<K, V> {
        WeakCacheHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

// == Weak Cache Handle ==
/// Non-owning counterpart of [`NotifyingCacheHandle`].
pub struct WeakCacheHandle<K, V> {
    shared: Weak<Shared<K, V>>,
}

impl<K, V> Clone for WeakCacheHandle<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<K, V> WeakCacheHandle<K, V> {
    /// Returns the handle if the cache is still alive.
    pub fn upgrade(&self) -> Option<NotifyingCacheHandle<K, V>> {
        self.shared
            .upgrade()
            .map(|shared| NotifyingCacheHandle { shared })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{advance, sleep, Instant};

    const WINDOW: Duration = Duration::from_millis(50);

    fn handle(capacity: usize) -> NotifyingCacheHandle<String, u32> {
        NotifyingCacheHandle::new("test", BoundedCache::new(capacity).unwrap(), WINDOW).unwrap()
    }

    fn record_fire_times(handle: &NotifyingCacheHandle<String, u32>) -> Arc<Mutex<Vec<Instant>>> {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        handle.subscribe(move |_| sink.lock().unwrap().push(Instant::now()));
        fired
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_notification() {
        let cache = handle(10);
        let fired = record_fire_times(&cache);
        let mut changes = cache.changes();

        for i in 0..5 {
            cache.set(format!("key{i}"), i, None);
            sleep(Duration::from_millis(10)).await;
        }
        cache.delete("key0");
        let last_mutation = Instant::now();

        sleep(Duration::from_millis(500)).await;

        let fired = fired.lock().unwrap().clone();
        assert_eq!(fired.len(), 1);
        assert!(fired[0] >= last_mutation + WINDOW);

        let event = changes.try_recv().unwrap();
        assert_eq!(event.cache, "test");
        assert_eq!(event.mutations, 6);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_mutations_notify_twice() {
        let cache = handle(10);
        let fired = record_fire_times(&cache);
        let mut changes = cache.changes();

        cache.set("a".to_string(), 1, None);
        sleep(WINDOW * 3).await;
        cache.set("b".to_string(), 2, None);
        sleep(WINDOW * 3).await;

        assert_eq!(fired.lock().unwrap().len(), 2);
        assert_eq!(changes.try_recv().unwrap().sequence, 1);
        assert_eq!(changes.try_recv().unwrap().sequence, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_never_notify() {
        let cache = handle(10);
        cache.set("a".to_string(), 1, None);
        sleep(WINDOW * 2).await;

        let fired = record_fire_times(&cache);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.peek("a"), Some(1));
        assert!(cache.contains_key("a"));
        assert_eq!(cache.get("missing"), None);
        sleep(WINDOW * 4).await;

        assert!(fired.lock().unwrap().is_empty());
        assert!(!cache.is_notification_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_delivery() {
        let cache = handle(10);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let sub = cache.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        cache.set("a".to_string(), 1, None);
        sleep(WINDOW * 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(sub.unsubscribe());
        assert_eq!(cache.observer_count(), 0);

        cache.set("b".to_string(), 2, None);
        sleep(WINDOW * 2).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_can_reenter_cache() {
        let cache = handle(10);
        let reader = cache.downgrade();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        cache.subscribe(move |_| {
            *sink.lock().unwrap() = reader.upgrade().and_then(|cache| cache.get("a"));
        });

        cache.set("a".to_string(), 42, None);
        sleep(WINDOW * 2).await;

        assert_eq!(*seen.lock().unwrap(), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_observer_does_not_block_others() {
        let cache = handle(10);
        cache.subscribe(|_| panic!("observer failure"));
        let fired = record_fire_times(&cache);

        cache.set("a".to_string(), 1, None);
        sleep(WINDOW * 2).await;
        cache.set("a".to_string(), 2, None);
        sleep(WINDOW * 2).await;

        assert_eq!(fired.lock().unwrap().len(), 2);
        assert_eq!(cache.get("a"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_notification() {
        let cache = handle(10);
        let fired = record_fire_times(&cache);
        let mut changes = cache.changes();

        cache.set("a".to_string(), 1, None);
        assert!(cache.is_notification_pending());
        drop(cache);

        sleep(WINDOW * 4).await;

        assert!(fired.lock().unwrap().is_empty());
        assert!(matches!(
            changes.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_missing_key_still_notifies() {
        let cache = handle(10);
        let mut changes = cache.changes();

        assert!(!cache.delete("missing"));
        sleep(WINDOW * 2).await;

        assert_eq!(changes.try_recv().unwrap().mutations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_does_not_notify() {
        let cache = handle(10);
        cache.set("short".to_string(), 1, Some(Duration::from_secs(1)));
        sleep(WINDOW * 2).await;
        let mut changes = cache.changes();

        advance(Duration::from_secs(2)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.live_len(), 0);
        assert_eq!(cache.purge_expired(), 1);
        sleep(WINDOW * 2).await;

        assert!(changes.try_recv().is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_fetch() {
        let cache = handle(10);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .get_or_fetch("remote".to_string(), None, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let failed = cache
            .get_or_fetch("broken".to_string(), None, || async {
                Err::<u32, _>("lookup failed".to_string())
            })
            .await;
        assert_eq!(failed, Err("lookup failed".to_string()));
        assert!(!cache.contains_key("broken"));
    }

    #[tokio::test]
    async fn test_weak_handle() {
        let cache = handle(10);
        let weak = cache.downgrade();
        assert!(weak.upgrade().is_some());

        drop(cache);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = NotifyingCacheHandle::<String, u32>::new(
            "test",
            BoundedCache::new(10).unwrap(),
            WINDOW,
        );
        assert!(matches!(
            result,
            Err(crate::error::CacheError::RuntimeUnavailable(_))
        ));
    }
}
