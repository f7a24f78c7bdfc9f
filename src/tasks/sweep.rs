//! TTL Sweep Task
//!
//! Background task that periodically purges expired cache entries so they
//! stop occupying capacity between accesses.

use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::{CacheError, Result};
use crate::notify::NotifyingCacheHandle;

/// Spawns a background task that periodically purges expired entries.
///
/// The task holds only a weak reference to the cache and exits on its own
/// once every handle has been dropped. Purging does not notify observers.
///
/// # Arguments
/// * `cache` - Handle to the cache to sweep
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Errors
/// `CacheError::InvalidSweepInterval` when `interval` is zero.
///
/// # Example
/// ```ignore
/// let sweep = spawn_sweep_task(&cache, Duration::from_secs(60))?;
/// // Later, during shutdown:
/// sweep.abort();
/// ```
pub fn spawn_sweep_task<K, V>(
    cache: &NotifyingCacheHandle<K, V>,
    interval: Duration,
) -> Result<JoinHandle<()>>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    if interval.is_zero() {
        return Err(CacheError::InvalidSweepInterval(interval));
    }

    let weak = cache.downgrade();
    let name = cache.name().to_string();

    Ok(tokio::spawn(async move {
        info!(
            "Starting TTL sweep for cache '{}' with interval of {:?}",
            name, interval
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(cache) = weak.upgrade() else {
                info!("Cache '{}' dropped, stopping TTL sweep", name);
                return;
            };
            let removed = cache.purge_expired();
            drop(cache);

            if removed > 0 {
                info!("TTL sweep '{}': removed {} expired entries", name, removed);
            } else {
                debug!("TTL sweep '{}': no expired entries found", name);
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BoundedCache;
    use tokio::time::sleep;

    fn cache() -> NotifyingCacheHandle<String, String> {
        NotifyingCacheHandle::new(
            "sweep_test",
            BoundedCache::new(100).unwrap(),
            Duration::from_millis(50),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_entries() {
        let cache = cache();
        cache.set(
            "expire_soon".to_string(),
            "value".to_string(),
            Some(Duration::from_secs(1)),
        );
        cache.set("long_lived".to_string(), "value".to_string(), None);

        let handle = spawn_sweep_task(&cache, Duration::from_secs(1)).unwrap();

        sleep(Duration::from_millis(2500)).await;

        // Structurally gone, not just hidden
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.contains_key("long_lived"));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_preserves_valid_entries() {
        let cache = cache();
        cache.set(
            "long_lived".to_string(),
            "value".to_string(),
            Some(Duration::from_secs(3600)),
        );

        let handle = spawn_sweep_task(&cache, Duration::from_secs(1)).unwrap();
        sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.get("long_lived").as_deref(), Some("value"));
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_stops_when_cache_dropped() {
        let cache = cache();
        let handle = spawn_sweep_task(&cache, Duration::from_secs(1)).unwrap();

        drop(cache);
        sleep(Duration::from_millis(2500)).await;

        assert!(handle.is_finished(), "Sweep should exit once the cache is gone");
    }

    #[tokio::test]
    async fn test_sweep_can_be_aborted() {
        let cache = cache();
        let handle = spawn_sweep_task(&cache, Duration::from_secs(1)).unwrap();

        handle.abort();

        sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let cache = cache();

        let result = spawn_sweep_task(&cache, Duration::ZERO);

        assert!(matches!(
            result,
            Err(CacheError::InvalidSweepInterval(Duration::ZERO))
        ));
    }
}
