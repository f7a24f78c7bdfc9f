//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and LRU eviction.

mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::Entry;
pub use lru::{RecencyList, SlotId};
pub use stats::CacheStats;
pub use store::BoundedCache;
