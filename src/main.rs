//! Lookup Cache - reference deployment
//!
//! Builds the six named lookup caches side by side, logs their change
//! notifications, and optionally sweeps expired entries in the background.

use std::hash::Hash;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lookup_cache::{
    spawn_sweep_task, CacheConfig, CachePurpose, ChangeEvent, NotifyingCacheHandle, Subscription,
};

/// The caches a lookup service memoizes its remote calls in.
///
/// Constructed once and passed to whoever performs the lookups.
struct LookupCaches {
    key_domains: NotifyingCacheHandle<String, String>,
    address_records: NotifyingCacheHandle<String, String>,
    reverse_addresses: NotifyingCacheHandle<String, String>,
    account_snapshots: NotifyingCacheHandle<String, serde_json::Value>,
    remote_documents: NotifyingCacheHandle<String, String>,
    auth_tokens: NotifyingCacheHandle<String, String>,
}

impl LookupCaches {
    fn build(config: &CacheConfig) -> lookup_cache::error::Result<Self> {
        Ok(Self {
            key_domains: config.build(CachePurpose::KeyDomain)?,
            address_records: config.build(CachePurpose::AddressRecord)?,
            reverse_addresses: config.build(CachePurpose::ReverseAddress)?,
            account_snapshots: config.build(CachePurpose::AccountSnapshot)?,
            remote_documents: config.build(CachePurpose::RemoteDocument)?,
            auth_tokens: config.build(CachePurpose::AuthToken)?,
        })
    }

    /// Subscribes a logging observer to every cache.
    fn log_changes(&self) -> Vec<Subscription> {
        vec![
            self.key_domains.subscribe(log_change),
            self.address_records.subscribe(log_change),
            self.reverse_addresses.subscribe(log_change),
            self.account_snapshots.subscribe(log_change),
            self.remote_documents.subscribe(log_change),
            self.auth_tokens.subscribe(log_change),
        ]
    }

    /// Starts one sweep task per cache.
    fn spawn_sweeps(
        &self,
        interval: Duration,
    ) -> lookup_cache::error::Result<Vec<JoinHandle<()>>> {
        Ok(vec![
            spawn_sweep_task(&self.key_domains, interval)?,
            spawn_sweep_task(&self.address_records, interval)?,
            spawn_sweep_task(&self.reverse_addresses, interval)?,
            spawn_sweep_task(&self.account_snapshots, interval)?,
            spawn_sweep_task(&self.remote_documents, interval)?,
            spawn_sweep_task(&self.auth_tokens, interval)?,
        ])
    }

    fn log_stats(&self) {
        log_stats(&self.key_domains);
        log_stats(&self.address_records);
        log_stats(&self.reverse_addresses);
        log_stats(&self.account_snapshots);
        log_stats(&self.remote_documents);
        log_stats(&self.auth_tokens);
    }
}

fn log_change(event: &ChangeEvent) {
    info!(
        "Cache '{}' changed: {} mutation(s), notification #{}",
        event.cache, event.mutations, event.sequence
    );
}

fn log_stats<K, V>(cache: &NotifyingCacheHandle<K, V>)
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    match serde_json::to_string(&cache.stats()) {
        Ok(stats) => info!("Cache '{}' stats: {}", cache.name(), stats),
        Err(e) => warn!("Cache '{}' stats unavailable: {}", cache.name(), e),
    }
}

/// Main entry point for the lookup cache deployment.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the named caches
/// 4. Subscribe logging observers
/// 5. Start background TTL sweeps if configured
/// 6. Wait for SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lookup_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lookup cache");

    let config = CacheConfig::from_env().context("Failed to load cache configuration")?;
    info!(
        "Configuration loaded: {}",
        serde_json::to_string(&config).context("Failed to render configuration")?
    );

    let caches = LookupCaches::build(&config).context("Failed to build caches")?;
    let subscriptions = caches.log_changes();
    info!("{} caches ready", CachePurpose::ALL.len());

    let sweeps = match config.sweep_interval() {
        Some(interval) => caches
            .spawn_sweeps(interval)
            .context("Failed to start TTL sweeps")?,
        None => {
            info!("TTL sweep disabled, expired entries are purged on access");
            Vec::new()
        }
    };

    shutdown_signal().await;

    for sweep in sweeps {
        sweep.abort();
    }
    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    caches.log_stats();

    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
