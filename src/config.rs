//! Configuration Module
//!
//! Capacity and TTL policy for each named cache instance, loaded from
//! environment variables with sensible defaults.

use std::env;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::BoundedCache;
use crate::error::{CacheError, Result};
use crate::notify::NotifyingCacheHandle;

// == Cache Purpose ==
/// The named cache instances a deployment runs side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePurpose {
    /// Public key to domain name binding
    KeyDomain,
    /// Address to resolution record
    AddressRecord,
    /// Reverse address lookup (informational)
    ReverseAddress,
    /// Account data snapshot
    AccountSnapshot,
    /// Remotely fetched document
    RemoteDocument,
    /// Issued auth token
    AuthToken,
}

impl CachePurpose {
    pub const ALL: [CachePurpose; 6] = [
        CachePurpose::KeyDomain,
        CachePurpose::AddressRecord,
        CachePurpose::ReverseAddress,
        CachePurpose::AccountSnapshot,
        CachePurpose::RemoteDocument,
        CachePurpose::AuthToken,
    ];

    /// Instance name used in logs and change events.
    pub fn name(self) -> &'static str {
        match self {
            CachePurpose::KeyDomain => "key_domain",
            CachePurpose::AddressRecord => "address_record",
            CachePurpose::ReverseAddress => "reverse_address",
            CachePurpose::AccountSnapshot => "account_snapshot",
            CachePurpose::RemoteDocument => "remote_document",
            CachePurpose::AuthToken => "auth_token",
        }
    }

    /// Prefix of the `<PREFIX>_CAPACITY` and `<PREFIX>_TTL_SECS` variables.
    pub fn env_prefix(self) -> &'static str {
        match self {
            CachePurpose::KeyDomain => "KEY_DOMAIN",
            CachePurpose::AddressRecord => "ADDRESS_RECORD",
            CachePurpose::ReverseAddress => "REVERSE_ADDRESS",
            CachePurpose::AccountSnapshot => "ACCOUNT_SNAPSHOT",
            CachePurpose::RemoteDocument => "REMOTE_DOCUMENT",
            CachePurpose::AuthToken => "AUTH_TOKEN",
        }
    }

    /// Suggested policy for this purpose.
    pub fn default_policy(self) -> CachePolicy {
        match self {
            CachePurpose::KeyDomain => CachePolicy::new(100, None),
            CachePurpose::AddressRecord => CachePolicy::new(1000, Some(10 * 60)),
            CachePurpose::ReverseAddress => CachePolicy::new(1000, Some(60 * 60)),
            CachePurpose::AccountSnapshot => CachePolicy::new(1000, Some(10 * 60)),
            CachePurpose::RemoteDocument => CachePolicy::new(100, None),
            CachePurpose::AuthToken => CachePolicy::new(100, None),
        }
    }
}

impl fmt::Display for CachePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// == Cache Policy ==
/// Capacity and default TTL of one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Maximum number of entries
    pub capacity: usize,
    /// Default TTL in seconds, None = entries never expire by time
    pub default_ttl_secs: Option<u64>,
}

impl CachePolicy {
    /// Creates a policy; `None` TTL means entries never expire by default.
    pub const fn new(capacity: usize, default_ttl_secs: Option<u64>) -> Self {
        Self {
            capacity,
            default_ttl_secs,
        }
    }

    /// Default TTL as a `Duration`.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Debounce window in milliseconds
    pub debounce_ms: u64,
    /// Background sweep interval in seconds, None = lazy expiry only
    pub sweep_interval_secs: Option<u64>,
    pub key_domain: CachePolicy,
    pub address_record: CachePolicy,
    pub reverse_address: CachePolicy,
    pub account_snapshot: CachePolicy,
    pub remote_document: CachePolicy,
    pub auth_token: CachePolicy,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEBOUNCE_MS` - Debounce window (default: 50)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - Sweep interval, 0 disables (default: disabled)
    /// - `<PREFIX>_CAPACITY` - Per-instance capacity
    /// - `<PREFIX>_TTL_SECS` - Per-instance default TTL, 0 means none
    ///
    /// # Errors
    /// `CacheError::InvalidSetting` when a variable is set but unparseable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var(&lookup, "CACHE_DEBOUNCE_MS")? {
            config.debounce_ms = ms;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CACHE_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval_secs = (secs > 0).then_some(secs);
        }

        for purpose in CachePurpose::ALL {
            let prefix = purpose.env_prefix();
            let policy = config.policy_mut(purpose);
            if let Some(capacity) = parse_var(&lookup, &format!("{prefix}_CAPACITY"))? {
                policy.capacity = capacity;
            }
            if let Some(secs) = parse_var::<u64, _>(&lookup, &format!("{prefix}_TTL_SECS"))? {
                policy.default_ttl_secs = (secs > 0).then_some(secs);
            }
        }

        Ok(config)
    }

    // == Accessors ==
    /// Debounce window shared by every instance.
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Background sweep interval, None when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }

    /// Policy configured for `purpose`.
    pub fn policy(&self, purpose: CachePurpose) -> CachePolicy {
        match purpose {
            CachePurpose::KeyDomain => self.key_domain,
            CachePurpose::AddressRecord => self.address_record,
            CachePurpose::ReverseAddress => self.reverse_address,
            CachePurpose::AccountSnapshot => self.account_snapshot,
            CachePurpose::RemoteDocument => self.remote_document,
            CachePurpose::AuthToken => self.auth_token,
        }
    }

    /// Mutable policy for `purpose`, used while applying overrides.
    pub fn policy_mut(&mut self, purpose: CachePurpose) -> &mut CachePolicy {
        match purpose {
            CachePurpose::KeyDomain => &mut self.key_domain,
            CachePurpose::AddressRecord => &mut self.address_record,
            CachePurpose::ReverseAddress => &mut self.reverse_address,
            CachePurpose::AccountSnapshot => &mut self.account_snapshot,
            CachePurpose::RemoteDocument => &mut self.remote_document,
            CachePurpose::AuthToken => &mut self.auth_token,
        }
    }

    // == Build ==
    /// Constructs the named cache instance for `purpose`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build<K, V>(&self, purpose: CachePurpose) -> Result<NotifyingCacheHandle<K, V>>
    where
        K: Eq + Hash + Clone,
        V: Clone,
    {
        let policy = self.policy(purpose);
        let cache = BoundedCache::with_default_ttl(policy.capacity, policy.default_ttl())?;
        NotifyingCacheHandle::new(purpose.name(), cache, self.debounce_window())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            sweep_interval_secs: None,
            key_domain: CachePurpose::KeyDomain.default_policy(),
            address_record: CachePurpose::AddressRecord.default_policy(),
            reverse_address: CachePurpose::ReverseAddress.default_policy(),
            account_snapshot: CachePurpose::AccountSnapshot.default_policy(),
            remote_document: CachePurpose::RemoteDocument.default_policy(),
            auth_token: CachePurpose::AuthToken.default_policy(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| CacheError::InvalidSetting {
            name: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}
