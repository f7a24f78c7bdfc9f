//! Debounce timer
//!
//! One Tokio task per cache waits for the first mutation, then sleeps until
//! the current deadline. Mutations arriving meanwhile only push the deadline
//! out; the task re-reads it after every wake-up and fires once it has truly
//! elapsed.
//!
//! ```text
//! Idle --mutation--> Pending(d) --mutation--> Pending(d') --d' elapses--> fire --> Idle
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::lock;
use super::observers::{ChangeEvent, ObserverRegistry};
use crate::error::{CacheError, Result};

#[derive(Debug, Default)]
struct DebounceState {
    /// None = Idle
    deadline: Option<Instant>,
    /// Mutations since the last notification
    mutations: u64,
}

pub(crate) struct Debouncer {
    window: Duration,
    state: Arc<Mutex<DebounceState>>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Debouncer {
    /// Spawns the timer task on the current Tokio runtime.
    pub(crate) fn spawn(
        cache: String,
        window: Duration,
        observers: Arc<ObserverRegistry>,
    ) -> Result<Self> {
        if window.is_zero() || Instant::now().checked_add(window).is_none() {
            return Err(CacheError::InvalidDebounceWindow(window));
        }
        let runtime =
            Handle::try_current().map_err(|e| CacheError::RuntimeUnavailable(e.to_string()))?;

        let state = Arc::new(Mutex::new(DebounceState::default()));
        let wake = Arc::new(Notify::new());
        let task = runtime.spawn(run_timer(cache, state.clone(), wake.clone(), observers));

        Ok(Self {
            window,
            state,
            wake,
            task,
        })
    }

    pub(crate) fn window(&self) -> Duration {
        self.window
    }

    // == Mark ==
    /// Records a mutation and (re)starts the timer.
    ///
    /// Only the Idle -> Pending transition wakes the task, so concurrent
    /// callers serialize on the state lock and exactly one of them starts
    /// the window. The deadline is read from the clock under the lock, so it only ever
    /// moves forward.
    pub(crate) fn mark(&self) {
        let was_idle = {
            let mut state = lock(&self.state);
            let now = Instant::now();
            let deadline = now.checked_add(self.window).unwrap_or(now);
            state.mutations += 1;
            let was_idle = state.deadline.is_none();
            state.deadline = Some(state.deadline.map_or(deadline, |d| d.max(deadline)));
            was_idle
        };
        if was_idle {
            self.wake.notify_one();
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        lock(&self.state).deadline.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        // Cancels a pending notification along with the task
        self.task.abort();
    }
}

async fn run_timer(
    cache: String,
    state: Arc<Mutex<DebounceState>>,
    wake: Arc<Notify>,
    observers: Arc<ObserverRegistry>,
) {
    let mut sequence = 0u64;

    loop {
        wake.notified().await;

        let mutations = loop {
            let wait_until = {
                let mut guard = lock(&state);
                match guard.deadline {
                    Some(deadline) if Instant::now() < deadline => deadline,
                    Some(_) => {
                        guard.deadline = None;
                        break std::mem::take(&mut guard.mutations);
                    }
                    None => break 0,
                }
            };
            tokio::time::sleep_until(wait_until).await;
        };

        if mutations == 0 {
            continue;
        }

        sequence += 1;
        let event = ChangeEvent {
            cache: cache.clone(),
            sequence,
            mutations,
            fired_at: Utc::now(),
        };
        let delivered = observers.deliver(&event);
        debug!(
            "Cache '{}' changed: notification #{} coalesced {} mutation(s), {} observer(s)",
            cache, sequence, mutations, delivered
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_runtime() {
        let result = Debouncer::spawn(
            "test".to_string(),
            Duration::from_millis(50),
            Arc::new(ObserverRegistry::new()),
        );
        assert!(matches!(result, Err(CacheError::RuntimeUnavailable(_))));
    }

    #[tokio::test]
    async fn test_rejects_zero_window() {
        let result = Debouncer::spawn(
            "test".to_string(),
            Duration::ZERO,
            Arc::new(ObserverRegistry::new()),
        );
        assert!(matches!(
            result,
            Err(CacheError::InvalidDebounceWindow(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_unrepresentable_window() {
        let result = Debouncer::spawn(
            "test".to_string(),
            Duration::MAX,
            Arc::new(ObserverRegistry::new()),
        );
        assert!(matches!(
            result,
            Err(CacheError::InvalidDebounceWindow(Duration::MAX))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_only_moves_forward() {
        let observers = Arc::new(ObserverRegistry::new());
        let debouncer =
            Debouncer::spawn("test".to_string(), Duration::from_millis(50), observers).unwrap();

        debouncer.mark();
        let first = lock(&debouncer.state).deadline.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        debouncer.mark();
        let second = lock(&debouncer.state).deadline.unwrap();

        assert_eq!(second, first + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_until_deadline() {
        let observers = Arc::new(ObserverRegistry::new());
        let mut changes = observers.channel();
        let debouncer =
            Debouncer::spawn("test".to_string(), Duration::from_millis(50), observers).unwrap();

        assert!(!debouncer.is_pending());
        debouncer.mark();
        debouncer.mark();
        assert!(debouncer.is_pending());

        let event = changes.recv().await.unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.mutations, 2);
        assert!(!debouncer.is_pending());
    }
}
