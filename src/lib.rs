//! Lookup Cache - capacity-bounded TTL caches with change notification
//!
//! Memoizes remote lookups with LRU eviction and per-entry expiry, and
//! signals observers after mutations with a debounced change event.
//!
//! ```no_run
//! use std::time::Duration;
//! use lookup_cache::{BoundedCache, NotifyingCacheHandle};
//!
//! # async fn demo() -> lookup_cache::error::Result<()> {
//! let cache = BoundedCache::with_default_ttl(1000, Some(Duration::from_secs(600)))?;
//! let records = NotifyingCacheHandle::new("address_record", cache, Duration::from_millis(50))?;
//!
//! let _subscription = records.subscribe(|event| println!("{} changed", event.cache));
//! records.set("GA7Q...".to_string(), "alice*example.org".to_string(), None);
//! assert!(records.get("GA7Q...").is_some());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod notify;
pub mod tasks;

pub use cache::{BoundedCache, CacheStats};
pub use config::{CacheConfig, CachePolicy, CachePurpose};
pub use error::CacheError;
pub use notify::{ChangeEvent, NotifyingCacheHandle, Subscription};
pub use tasks::spawn_sweep_task;
