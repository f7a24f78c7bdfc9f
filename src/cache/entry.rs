//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.
//!
//! Timestamps use `tokio::time::Instant` so that paused-clock tests can
//! drive expiry deterministically.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct Entry<K, V> {
    /// The key this entry is indexed under
    pub key: K,
    /// The stored value
    pub value: V,
    /// Last write or read hit
    pub touched_at: Instant,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates a new entry written at `now` with an optional TTL.
    ///
    /// A TTL too long to represent as an instant means no expiration.
    pub fn new(key: K, value: V, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            key,
            value,
            touched_at: now,
            expires_at: expiry(now, ttl),
        }
    }

    // == Replace ==
    /// Overwrites value and TTL in place, as if freshly written at `now`.
    pub fn replace(&mut self, value: V, ttl: Option<Duration>, now: Instant) -> V {
        self.touched_at = now;
        self.expires_at = expiry(now, ttl);
        std::mem::replace(&mut self.value, value)
    }

    // == Is Expired ==
    /// Checks if the entry has expired as of `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`, so an
    /// entry written with TTL `T` is gone at exactly `T` after the write.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// Yields `Some(Duration::ZERO)` once the entry has expired.
    pub fn ttl_remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(now))
    }
}

fn expiry(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|ttl| now.checked_add(ttl))
}
