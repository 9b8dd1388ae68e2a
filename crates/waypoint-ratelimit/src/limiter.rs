//! The ordered rate limiter: RPM, then concurrency, then the leased cost
//! windows, first failure wins.

use chrono::Utc;
use redis::AsyncCommands;
use waypoint_core::{CostLimits, DailyResetMode, LeaseId, LimitType, RateLimitError};
use waypoint_redis::keys::{self, QuotaScope, QuotaWindow};
use waypoint_redis::lease::{
    check_and_reserve_cost, check_and_track_concurrency, reconcile_cost_lease, CostLeaseOutcome,
    CostWindow, ConcurrencyOutcome,
};
use waypoint_redis::RedisClient;

use crate::windows::{as_cost_windows, ordered_cost_windows};

/// Active-session-set TTL, refreshed elsewhere by session activity; this is
/// only the ceiling if no refresh ever lands.
const SESSION_SET_TTL_SECS: u64 = 3600;
const RPM_WINDOW_SECS: i64 = 60;

fn effective(key_limit: f64, user_limit: f64) -> f64 {
    if key_limit > 0.0 {
        key_limit
    } else {
        user_limit
    }
}

/// A granted reservation against one or more cost counters, pending
/// reconciliation with the request's actual cost.
#[derive(Debug)]
pub struct RateLimitLease {
    lease_id: LeaseId,
    reserved_usd: f64,
    counter_keys: Vec<String>,
}

impl RateLimitLease {
    /// Stable id for this lease, used by the periodic unreconciled-lease scan.
    #[must_use]
    pub fn id(&self) -> &LeaseId {
        &self.lease_id
    }

    /// Apply `actual_cost_usd - reserved` to every counter this lease touched.
    /// Must be awaited to completion, including on the error/abort path.
    ///
    /// # Errors
    ///
    /// Returns an error on connection or command failure.
    pub async fn reconcile(self, redis: &RedisClient, actual_cost_usd: f64) -> Result<(), waypoint_redis::RedisError> {
        let mut conn = redis.pool().get().await?;
        let keys: Vec<&str> = self.counter_keys.iter().map(String::as_str).collect();
        reconcile_cost_lease(&mut conn, &keys, self.reserved_usd, actual_cost_usd).await
    }
}

/// Per-request arguments to [`RateLimiter::check_and_reserve`].
pub struct Subject<'a> {
    pub key_id: &'a str,
    pub user_id: &'a str,
    pub session_id: &'a str,
    pub key_limits: &'a CostLimits,
    pub user_limits: &'a CostLimits,
    pub daily_reset_mode: DailyResetMode,
    pub daily_reset_time: &'a str,
}

/// Evaluates the ordered rate-limit dimensions against Redis.
pub struct RateLimiter {
    redis: RedisClient,
}

impl RateLimiter {
    /// Wrap a Redis client.
    #[must_use]
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    async fn current_value(&self, counter_key: &str) -> f64 {
        let Ok(mut conn) = self.redis.pool().get().await else {
            return 0.0;
        };
        let raw: Option<String> = conn.get(counter_key).await.unwrap_or_default();
        raw.and_then(|s| s.parse().ok()).unwrap_or(0.0)
    }

    /// Run the full ordered check: RPM, concurrency, then the cost-window
    /// lease. On success, `reserve_usd` has been atomically added to every
    /// cost counter in the returned lease; the caller must reconcile it once
    /// the request's actual cost is known.
    ///
    /// # Errors
    ///
    /// Returns the first violated dimension, in documented order. On a Redis
    /// connection failure the caller's configured fallback policy applies
    /// (permit-open for RPM/5h, deny-closed for total); this function itself
    /// always reports what it could determine and never panics on a
    /// transient error.
    pub async fn check_and_reserve(&self, subject: &Subject<'_>, reserve_usd: f64) -> Result<RateLimitLease, RateLimitError> {
        let now = Utc::now();

        self.check_rpm(subject).await?;
        self.check_concurrency(subject).await?;

        let resolved = ordered_cost_windows(
            subject.key_id,
            subject.user_id,
            subject.key_limits,
            subject.user_limits,
            subject.daily_reset_mode,
            subject.daily_reset_time,
            now,
        );
        let windows = as_cost_windows(&resolved);

        let mut conn = self
            .redis
            .pool()
            .get()
            .await
            .map_err(|_| deny_closed_total(subject, reserve_usd))?;

        match check_and_reserve_cost(&mut conn, &windows, reserve_usd).await {
            Ok(CostLeaseOutcome::Granted) => Ok(RateLimitLease {
                lease_id: LeaseId::new(),
                reserved_usd: reserve_usd,
                counter_keys: resolved.into_iter().map(|w| w.counter_key).collect(),
            }),
            Ok(CostLeaseOutcome::Denied { window_index }) => {
                let hit = &resolved[window_index];
                let current = self.current_value(&hit.counter_key).await;
                Err(RateLimitError {
                    limit_type: hit.limit_type,
                    current,
                    limit: hit.limit,
                    reset_at: None,
                })
            }
            Err(err) => {
                tracing::warn!(%err, "rate limit redis call failed, denying closed on total");
                Err(deny_closed_total(subject, reserve_usd))
            }
        }
    }

    async fn check_rpm(&self, subject: &Subject<'_>) -> Result<(), RateLimitError> {
        let limit = effective(f64::from(subject.key_limits.rpm), f64::from(subject.user_limits.rpm));
        if limit <= 0.0 {
            return Ok(());
        }
        let counter_key = keys::quota_counter(QuotaScope::Key, subject.key_id, QuotaWindow::Rpm);
        let windows = [CostWindow {
            counter_key: &counter_key,
            limit,
            ttl_secs: RPM_WINDOW_SECS,
        }];
        let mut conn = match self.redis.pool().get().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(%err, "rpm check redis unavailable, permitting open");
                return Ok(());
            }
        };
        match check_and_reserve_cost(&mut conn, &windows, 1.0).await {
            Ok(CostLeaseOutcome::Granted) => Ok(()),
            Ok(CostLeaseOutcome::Denied { .. }) => {
                let current = self.current_value(&counter_key).await;
                Err(RateLimitError {
                    limit_type: LimitType::Rpm,
                    current,
                    limit,
                    reset_at: None,
                })
            }
            Err(err) => {
                tracing::warn!(%err, "rpm check failed, permitting open");
                Ok(())
            }
        }
    }

    async fn check_concurrency(&self, subject: &Subject<'_>) -> Result<(), RateLimitError> {
        let key_set = keys::session_key_set(subject.key_id);
        let user_set = keys::session_user_set(subject.user_id);
        let mut conn = match self.redis.pool().get().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(%err, "concurrency check redis unavailable, permitting open");
                return Ok(());
            }
        };
        let outcome = check_and_track_concurrency(
            &mut conn,
            &key_set,
            &user_set,
            subject.session_id,
            subject.key_limits.concurrent_sessions,
            subject.user_limits.concurrent_sessions,
            SESSION_SET_TTL_SECS,
        )
        .await;
        match outcome {
            Ok(ConcurrencyOutcome::Admitted) => Ok(()),
            Ok(ConcurrencyOutcome::KeyLimitReached) => Err(concurrency_error(effective(
                f64::from(subject.key_limits.concurrent_sessions),
                f64::from(subject.user_limits.concurrent_sessions),
            ))),
            Ok(ConcurrencyOutcome::UserLimitReached) => {
                Err(concurrency_error(f64::from(subject.user_limits.concurrent_sessions)))
            }
            Err(err) => {
                tracing::warn!(%err, "concurrency check failed, permitting open");
                Ok(())
            }
        }
    }

    /// Release a session's concurrency-set membership. Call once per
    /// admitted session on teardown, symmetric with the implicit admit in
    /// [`Self::check_and_reserve`].
    pub async fn release_concurrency(&self, key_id: &str, user_id: &str, session_id: &str) {
        let key_set = keys::session_key_set(key_id);
        let user_set = keys::session_user_set(user_id);
        waypoint_redis::client::fire_and_forget("ratelimit_release_concurrency", || async {
            let mut conn = self.redis.pool().get().await?;
            waypoint_redis::lease::release_concurrency(&mut conn, &key_set, &user_set, session_id).await
        })
        .await;
    }
}

fn concurrency_error(limit: f64) -> RateLimitError {
    RateLimitError {
        limit_type: LimitType::Concurrency,
        current: limit,
        limit,
        reset_at: None,
    }
}

fn deny_closed_total(subject: &Subject<'_>, reserve_usd: f64) -> RateLimitError {
    RateLimitError {
        limit_type: LimitType::Total,
        current: reserve_usd,
        limit: effective(subject.key_limits.total_usd, subject.user_limits.total_usd),
        reset_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_closed_total_reports_total_limit_type() {
        let key_limits = CostLimits {
            total_usd: 10.0,
            ..CostLimits::default()
        };
        let user_limits = CostLimits::default();
        let subject = Subject {
            key_id: "k1",
            user_id: "u1",
            session_id: "s1",
            key_limits: &key_limits,
            user_limits: &user_limits,
            daily_reset_mode: DailyResetMode::Rolling,
            daily_reset_time: "",
        };
        let err = deny_closed_total(&subject, 1.0);
        assert_eq!(err.limit_type, LimitType::Total);
        assert_eq!(err.limit, 10.0);
    }
}
