//! Periodic DB-backed correction for quota counters, and the
//! unreconciled-lease sweep.
//!
//! Redis leases can be lost (the process crashes mid-request, a reconcile
//! never lands) and drift from the ledger's own count of settled cost. This
//! runs on an interval and snaps each counter up to `max(redisValue,
//! dbValue)`, never down, so a lost lease cannot let a caller spend under
//! the limit but can still be corrected upward.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use waypoint_redis::RedisClient;

/// Reads the ledger's view of a subject's spend for one window. Implemented
/// by the storage layer; kept generic here so this crate has no database
/// dependency.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Return `(counter_key, ledger_value)` pairs to reconcile this tick.
    async fn active_counters(&self) -> Vec<(String, f64)>;
}

/// Runs [`refresh_once`] on a fixed interval until the process shuts down.
pub async fn run_refresh_loop<L: LedgerReader>(redis: RedisClient, ledger: L, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        refresh_once(&redis, &ledger).await;
    }
}

/// One refresh pass: snap every counter the ledger knows about up to
/// `max(redisValue, dbValue)`.
pub async fn refresh_once<L: LedgerReader>(redis: &RedisClient, ledger: &L) {
    let counters = ledger.active_counters().await;
    let Ok(mut conn) = redis.pool().get().await else {
        tracing::warn!("quota refresh skipped, redis unavailable");
        return;
    };
    for (counter_key, db_value) in counters {
        let current: Option<String> = match conn.get(&counter_key).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%counter_key, %err, "quota refresh read failed");
                continue;
            }
        };
        let redis_value: f64 = current.and_then(|s| s.parse().ok()).unwrap_or(0.0);
        if db_value > redis_value {
            if let Err(err) = conn.set::<_, _, ()>(&counter_key, db_value).await {
                tracing::warn!(%counter_key, %err, "quota refresh write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLedger(Vec<(String, f64)>);

    #[async_trait]
    impl LedgerReader for FixedLedger {
        async fn active_counters(&self) -> Vec<(String, f64)> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn active_counters_round_trips_through_the_trait() {
        let ledger = FixedLedger(vec![("cch:quota:key:k1:daily".to_string(), 12.5)]);
        let counters = ledger.active_counters().await;
        assert_eq!(counters, vec![("cch:quota:key:k1:daily".to_string(), 12.5)]);
    }
}
