//! Error types for the cache
//!
//! Every variant is a configuration error raised at construction time.
//! Reads, writes and deletes on a constructed cache never fail.

use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache construction and configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Capacity must hold at least one entry
    #[error("Invalid capacity: {0} (must be at least 1)")]
    InvalidCapacity(usize),

    /// Debounce window must be non-zero and representable as a deadline
    #[error("Invalid debounce window: {0:?} (must be non-zero and finite)")]
    InvalidDebounceWindow(Duration),

    /// A default TTL, when set, must be non-zero
    #[error("Invalid TTL: {0:?} (must be non-zero)")]
    InvalidTtl(Duration),

    /// Notifying handles schedule timers on the ambient Tokio runtime
    #[error("No Tokio runtime available: {0}")]
    RuntimeUnavailable(String),

    /// Sweep interval must be non-zero
    #[error("Invalid sweep interval: {0:?} (must be non-zero)")]
    InvalidSweepInterval(Duration),

    /// A configuration value could not be parsed
    #[error("Invalid setting {name}={value:?}: {reason}")]
    InvalidSetting {
        name: String,
        value: String,
        reason: String,
    },
}

impl CacheError {
    /// Returns true for errors caused by a bad configuration value.
    ///
    /// Only `RuntimeUnavailable` depends on the calling context instead.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, CacheError::RuntimeUnavailable(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CacheError::InvalidCapacity(0).to_string(),
            "Invalid capacity: 0 (must be at least 1)"
        );
        assert!(CacheError::InvalidDebounceWindow(Duration::ZERO)
            .to_string()
            .contains("debounce"));

        let err = CacheError::InvalidSetting {
            name: "CACHE_DEBOUNCE_MS".to_string(),
            value: "soon".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert!(err.to_string().contains("CACHE_DEBOUNCE_MS=\"soon\""));
    }

    #[test]
    fn test_is_configuration() {
        assert!(CacheError::InvalidCapacity(0).is_configuration());
        assert!(CacheError::InvalidTtl(Duration::ZERO).is_configuration());
        assert!(!CacheError::RuntimeUnavailable("none".to_string()).is_configuration());
    }
}
