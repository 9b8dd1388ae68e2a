//! Per-provider circuit breaker config cache: 5-minute TTL, in-flight
//! coalescing (only one load per id at a time), a forced reload at most
//! every 60s for non-closed states, and version-based invalidation driven
//! by [`waypoint_redis::CacheVersion`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use waypoint_core::CircuitBreakerConfig;
use waypoint_redis::CacheVersion;

const TTL: Duration = Duration::minutes(5);
const NON_CLOSED_RELOAD_INTERVAL: Duration = Duration::seconds(60);

/// Loads a provider's circuit breaker tuning from its backing store
/// (Redis/DB). Implemented by the storage layer; kept generic here so this
/// crate does not depend on a concrete database driver.
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// Fetch the current config for `provider_id`.
    async fn load(&self, provider_id: &str) -> CircuitBreakerConfig;
}

struct Entry {
    config: CircuitBreakerConfig,
    loaded_at: DateTime<Utc>,
    version: u64,
}

/// Caches [`CircuitBreakerConfig`] per provider id.
pub struct ConfigCache<L: ConfigLoader> {
    loader: L,
    entries: DashMap<String, Arc<Mutex<Option<Entry>>>>,
    version: CacheVersion,
}

impl<L: ConfigLoader> ConfigCache<L> {
    /// Build a cache over `loader`, invalidated by `version`.
    #[must_use]
    pub fn new(loader: L, version: CacheVersion) -> Self {
        Self {
            loader,
            entries: DashMap::new(),
            version,
        }
    }

    /// Fetch the config for `provider_id`, reloading if stale.
    ///
    /// `is_non_closed` should reflect whether the breaker's current state is
    /// anything other than closed; non-closed entries are force-reloaded at
    /// most every 60 seconds so admin config changes take effect quickly
    /// while a provider is degraded.
    pub async fn get(&self, provider_id: &str, is_non_closed: bool) -> CircuitBreakerConfig {
        let slot = self
            .entries
            .entry(provider_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        // Holding this lock across the (possible) load is what gives us
        // in-flight coalescing: a second caller for the same id blocks here
        // instead of issuing a redundant load.
        let mut guard = slot.lock().await;
        let now = Utc::now();
        let current_version = self.version.current();

        let stale = match guard.as_ref() {
            None => true,
            Some(entry) => {
                let age = now - entry.loaded_at;
                age > TTL
                    || entry.version != current_version
                    || (is_non_closed && age > NON_CLOSED_RELOAD_INTERVAL)
            }
        };

        if stale {
            let config = self.loader.load(provider_id).await;
            *guard = Some(Entry {
                config,
                loaded_at: now,
                version: current_version,
            });
        }

        guard.as_ref().map(|e| e.config).unwrap_or_default()
    }
}
