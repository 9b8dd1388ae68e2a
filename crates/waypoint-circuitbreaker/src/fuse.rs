//! The vendor+type fuse: a coarse kill-switch for `(vendorId, providerType)`
//! pairs, used when every endpoint of a vendor+type is unhealthy or a mass
//! timeout was observed.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use waypoint_redis::{client::fire_and_forget, keys, RedisClient};

/// Fuse lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuseState {
    /// Traffic flows normally.
    Closed,
    /// Traffic to this vendor+type is suspended.
    Open,
}

/// Persisted state of one vendor+type fuse.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FuseRecord {
    pub state: FuseState,
    pub open_until: Option<DateTime<Utc>>,
    /// Set by an admin; supersedes auto-open and never auto-closes.
    pub manual_open: bool,
}

impl Default for FuseRecord {
    fn default() -> Self {
        Self {
            state: FuseState::Closed,
            open_until: None,
            manual_open: false,
        }
    }
}

impl FuseRecord {
    /// Whether this vendor+type is currently blocked.
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if self.manual_open {
            return true;
        }
        self.state == FuseState::Open && self.open_until.is_none_or(|until| now < until)
    }

    /// Auto-open triggered by health signals (all endpoints unhealthy, mass
    /// timeout). Enforces a minimum 1-second cool-down. A no-op if manually
    /// opened.
    pub fn auto_open(&mut self, now: DateTime<Utc>, cooldown_ms: u64) {
        if self.manual_open {
            return;
        }
        let cooldown = cooldown_ms.max(1000);
        self.state = FuseState::Open;
        self.open_until = Some(now + Duration::milliseconds(i64::try_from(cooldown).unwrap_or(i64::MAX)));
    }

    /// Lazily auto-close an expired auto-open fuse. Manual-open never
    /// auto-closes.
    pub fn auto_close_if_expired(&mut self, now: DateTime<Utc>) {
        if self.manual_open {
            return;
        }
        if self.state == FuseState::Open && self.open_until.is_some_and(|until| now >= until) {
            self.state = FuseState::Closed;
            self.open_until = None;
        }
    }

    /// Admin manual-open: supersedes any auto state and never auto-closes.
    pub fn manual_open(&mut self) {
        self.manual_open = true;
        self.state = FuseState::Open;
        self.open_until = None;
    }

    /// Admin manual-reset.
    pub fn manual_reset(&mut self) {
        *self = Self::default();
    }
}

/// Redis-persisted, in-process-cached tracker for vendor+type fuses.
pub struct FuseTracker {
    redis: RedisClient,
    cache: DashMap<(String, String), FuseRecord>,
}

impl FuseTracker {
    /// Wrap a Redis client.
    #[must_use]
    pub fn new(redis: RedisClient) -> Self {
        Self {
            redis,
            cache: DashMap::new(),
        }
    }

    async fn load(&self, vendor_id: &str, provider_type: &str) -> FuseRecord {
        let cache_key = (vendor_id.to_string(), provider_type.to_string());
        if let Some(cached) = self.cache.get(&cache_key) {
            if !cached.is_open(Utc::now()) {
                return *cached;
            }
        }
        let redis_key = keys::circuit_breaker_vendor_type_fuse(vendor_id, provider_type);
        let record = match self.redis.get_json::<FuseRecord>(&redis_key).await {
            Ok(Some(record)) => record,
            Ok(None) => FuseRecord::default(),
            Err(err) => {
                tracing::warn!(%vendor_id, %provider_type, %err, "fuse redis read failed, defaulting to closed");
                FuseRecord::default()
            }
        };
        let _ = self.cache.insert(cache_key, record);
        record
    }

    async fn persist(&self, vendor_id: &str, provider_type: &str, record: FuseRecord) {
        let cache_key = (vendor_id.to_string(), provider_type.to_string());
        let _ = self.cache.insert(cache_key, record);
        let redis_key = keys::circuit_breaker_vendor_type_fuse(vendor_id, provider_type);
        let redis = self.redis.clone();
        fire_and_forget("vendor_type_fuse_persist", || async move {
            redis.set_json(&redis_key, &record).await
        })
        .await;
    }

    /// Whether the vendor+type is currently blocked.
    pub async fn is_open(&self, vendor_id: &str, provider_type: &str) -> bool {
        let mut record = self.load(vendor_id, provider_type).await;
        let now = Utc::now();
        let was_open = record.is_open(now);
        record.auto_close_if_expired(now);
        let open = record.is_open(now);
        if was_open != open {
            self.persist(vendor_id, provider_type, record).await;
        }
        open
    }

    /// Trip the fuse automatically.
    pub async fn auto_open(&self, vendor_id: &str, provider_type: &str, cooldown_ms: u64) {
        let mut record = self.load(vendor_id, provider_type).await;
        record.auto_open(Utc::now(), cooldown_ms);
        self.persist(vendor_id, provider_type, record).await;
    }

    /// Admin manual-open.
    pub async fn manual_open(&self, vendor_id: &str, provider_type: &str) {
        let mut record = self.load(vendor_id, provider_type).await;
        record.manual_open();
        self.persist(vendor_id, provider_type, record).await;
    }

    /// Admin manual-reset.
    pub async fn manual_reset(&self, vendor_id: &str, provider_type: &str) {
        let mut record = self.load(vendor_id, provider_type).await;
        record.manual_reset();
        self.persist(vendor_id, provider_type, record).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_open_enforces_minimum_cooldown() {
        let mut record = FuseRecord::default();
        let now = Utc::now();
        record.auto_open(now, 10);
        assert_eq!(record.open_until, Some(now + Duration::milliseconds(1000)));
    }

    #[test]
    fn manual_open_supersedes_and_blocks_auto_close() {
        let mut record = FuseRecord::default();
        let now = Utc::now();
        record.manual_open();
        record.auto_close_if_expired(now + Duration::hours(1));
        assert!(record.is_open(now + Duration::hours(1)));
    }

    #[test]
    fn auto_close_after_expiry() {
        let mut record = FuseRecord::default();
        let now = Utc::now();
        record.auto_open(now, 1000);
        assert!(record.is_open(now));
        record.auto_close_if_expired(now + Duration::seconds(2));
        assert!(!record.is_open(now + Duration::seconds(2)));
    }

    #[test]
    fn manual_reset_clears_manual_flag() {
        let mut record = FuseRecord::default();
        record.manual_open();
        record.manual_reset();
        assert!(!record.manual_open);
        assert_eq!(record.state, FuseState::Closed);
    }
}
