//! Notifying Cache Module
//!
//! Wraps a [`BoundedCache`](crate::cache::BoundedCache) behind a mutex and
//! emits a debounced change signal after mutations.

mod debounce;
mod handle;
mod observers;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use handle::{NotifyingCacheHandle, WeakCacheHandle};
pub use observers::{ChangeEvent, Observer, Subscription};

/// Default debounce window
pub const DEFAULT_DEBOUNCE_WINDOW: std::time::Duration = std::time::Duration::from_millis(50);

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Cache state stays consistent across a panic because every mutation
/// completes before user code can run.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
