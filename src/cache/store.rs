//! Bounded Cache Module
//!
//! Main cache engine combining a hash index with an O(1) recency list and
//! per-entry TTL expiration.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::cache::{CacheStats, Entry, RecencyList, SlotId};
use crate::error::{CacheError, Result};

// == Bounded Cache ==
/// Capacity-bounded LRU cache with optional per-entry TTL.
///
/// Expired entries are never returned. They are purged lazily when a read
/// runs into them, or eagerly through [`BoundedCache::purge_expired`]. Until
/// one of those happens an expired entry still occupies a slot, so
/// [`BoundedCache::len`] may exceed [`BoundedCache::live_len`].
///
/// The cache itself is not synchronized; share it through
/// [`NotifyingCacheHandle`](crate::notify::NotifyingCacheHandle), which wraps
/// it in a mutex.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    /// Key to recency-list slot
    index: HashMap<K, SlotId>,
    /// Entries ordered from most to least recently used
    order: RecencyList<Entry<K, V>>,
    /// Maximum number of entries allowed
    capacity: NonZeroUsize,
    /// TTL applied to writes that do not carry their own
    default_ttl: Option<Duration>,
    /// Performance statistics
    stats: CacheStats,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a cache holding at most `capacity` entries that never expire
    /// unless a write asks for a TTL.
    ///
    /// # Errors
    /// `CacheError::InvalidCapacity` when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_default_ttl(capacity, None)
    }

    /// Creates a cache whose writes without an explicit TTL use `default_ttl`.
    ///
    /// # Errors
    /// - `CacheError::InvalidCapacity` when `capacity` is zero
    /// - `CacheError::InvalidTtl` when `default_ttl` is `Some(Duration::ZERO)`
    pub fn with_default_ttl(capacity: usize, default_ttl: Option<Duration>) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::InvalidCapacity(capacity))?;
        if let Some(ttl) = default_ttl.filter(Duration::is_zero) {
            return Err(CacheError::InvalidTtl(ttl));
        }

        Ok(Self {
            index: HashMap::with_capacity(capacity.get()),
            order: RecencyList::with_capacity(capacity.get()),
            capacity,
            default_ttl,
            stats: CacheStats::new(capacity.get()),
        })
    }

    // == Get ==
    /// Retrieves a value by key and promotes it to most recently used.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let Some(slot) = self.live_slot(key, now) else {
            self.stats.record_miss();
            return None;
        };

        self.order.touch(slot);
        let entry = self.order.get_mut(slot)?;
        entry.touched_at = now;
        self.stats.record_hit();
        Some(entry.value.clone())
    }

    // == Peek ==
    /// Retrieves a live value without touching recency or statistics.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let slot = self.index.get(key)?;
        self.order
            .get(*slot)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| &entry.value)
    }

    /// Returns true if a live entry exists for `key`. Does not promote.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.peek(key).is_some()
    }

    // == TTL Remaining ==
    /// Remaining time-to-live of a live entry.
    ///
    /// `None` when the key is absent, expired, or has no TTL.
    pub fn ttl_remaining<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let slot = self.index.get(key)?;
        self.order
            .get(*slot)
            .filter(|entry| !entry.is_expired_at(now))
            .and_then(|entry| entry.ttl_remaining(now))
    }

    // == Set ==
    /// Stores a key-value pair with optional TTL.
    ///
    /// If the key already exists, the value is overwritten, the TTL is reset
    /// and the entry is promoted. If the key is new and the cache is at
    /// capacity, the least recently used entry is evicted first.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL (falls back to the default TTL if None)
    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>) {
        let now = Instant::now();
        let ttl = ttl.or(self.default_ttl);

        if let Some(&slot) = self.index.get(&key) {
            if let Some(entry) = self.order.get_mut(slot) {
                entry.replace(value, ttl, now);
                self.order.touch(slot);
                return;
            }
        }

        if self.order.len() >= self.capacity.get() {
            self.evict_oldest(now);
        }

        let slot = self.order.push_front(Entry::new(key.clone(), value, ttl, now));
        self.index.insert(key, slot);
        self.stats.set_total_entries(self.order.len());
    }

    // == Delete ==
    /// Removes an entry by key.
    ///
    /// Returns true if an entry was removed. Deleting a missing key is a no-op.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(slot) = self.index.remove(key) else {
            return false;
        };
        self.order.remove(slot);
        self.stats.set_total_entries(self.order.len());
        true
    }

    /// Removes every entry. Returns how many were held.
    pub fn clear(&mut self) -> usize {
        let removed = self.order.len();
        self.index.clear();
        self.order.clear();
        self.stats.set_total_entries(0);
        removed
    }

    // == Purge Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = self
            .order
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired {
            if let Some(slot) = self.index.remove(key) {
                self.order.remove(slot);
            }
        }

        self.stats.record_expirations(expired.len());
        self.stats.set_total_entries(self.order.len());
        expired.len()
    }

    // == Keys ==
    /// Live keys, most recently used first.
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        self.order
            .iter()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect()
    }

    // == Length ==
    /// Returns the number of entries held, including expired entries that
    /// have not been purged yet.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    // == Live Length ==
    /// Returns the number of unexpired entries. O(n).
    pub fn live_len(&self) -> usize {
        let now = Instant::now();
        self.order
            .iter()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    // == Is Empty ==
    /// Returns true if no entries are held, expired or not.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // == Capacity ==
    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    // == Default TTL ==
    /// Returns the TTL applied to writes that do not specify one.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.order.len());
        stats
    }

    /// Resolves `key` to its slot, purging the entry if it has expired.
    fn live_slot<Q>(&mut self, key: &Q, now: Instant) -> Option<SlotId>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        let expired = self.order.get(slot).map_or(true, |e| e.is_expired_at(now));
        if !expired {
            return Some(slot);
        }

        self.index.remove(key);
        self.order.remove(slot);
        self.stats.record_expirations(1);
        self.stats.set_total_entries(self.order.len());
        None
    }

    fn evict_oldest(&mut self, now: Instant) {
        let Some(entry) = self.order.evict_oldest() else {
            return;
        };
        self.index.remove(&entry.key);

        // An expired tail is reclaimed, not evicted
        if entry.is_expired_at(now) {
            self.stats.record_expirations(1);
        } else {
            self.stats.record_eviction();
            debug!(
                "Evicted least recently used entry (idle {:?})",
                now.saturating_duration_since(entry.touched_at)
            );
        }
    }
}
