//! Builds the ordered list of cost windows a reservation must clear, and
//! works out the TTL each counter needs.

use chrono::{DateTime, NaiveTime, Utc};
use waypoint_core::{CostLimits, DailyResetMode};
use waypoint_redis::keys::{self, QuotaScope, QuotaWindow};
use waypoint_redis::lease::CostWindow;

const FIVE_HOURS_SECS: i64 = 5 * 3600;
const WEEK_SECS: i64 = 7 * 24 * 3600;
const MONTH_SECS: i64 = 30 * 24 * 3600;

/// `0` (or negative) means "no cap" to the lease script.
fn limit_or_unlimited(limit: f64) -> f64 {
    if limit > 0.0 {
        limit
    } else {
        0.0
    }
}

fn effective(key_limit: f64, user_limit: f64) -> f64 {
    if key_limit > 0.0 {
        key_limit
    } else {
        user_limit
    }
}

/// Seconds until a fixed-time daily window next resets. `reset_time` is
/// `HH:MM` in the system timezone (treated as UTC; the engine runs in one
/// timezone by policy). Falls back to a full day if unparsable.
#[must_use]
pub fn fixed_daily_ttl_secs(reset_time: &str, now: DateTime<Utc>) -> i64 {
    let Some(reset) = NaiveTime::parse_from_str(reset_time, "%H:%M").ok() else {
        return 86_400;
    };
    let today_reset = now.date_naive().and_time(reset).and_utc();
    let next_reset = if now < today_reset {
        today_reset
    } else {
        today_reset + chrono::Duration::days(1)
    };
    (next_reset - now).num_seconds().max(1)
}

/// TTL in seconds for the key-scoped daily counter, honoring the key's reset
/// mode.
#[must_use]
pub fn daily_ttl_secs(mode: DailyResetMode, reset_time: &str, now: DateTime<Utc>) -> i64 {
    match mode {
        DailyResetMode::Fixed => fixed_daily_ttl_secs(reset_time, now),
        DailyResetMode::Rolling => 86_400,
    }
}

/// One resolved cost window check, paired with the [`waypoint_core::LimitType`]
/// it reports as on denial.
pub struct ResolvedWindow {
    pub limit_type: waypoint_core::LimitType,
    pub counter_key: String,
    pub limit: f64,
    pub ttl_secs: i64,
}

/// Build the ordered cost-window list per the documented ordering: total,
/// 5h(key), 5h(user), daily(key), daily(user), weekly(key), weekly(user),
/// monthly(key), monthly(user). RPM and concurrency are checked separately
/// before this list, since they are not cost-reserve dimensions.
#[must_use]
pub fn ordered_cost_windows(
    key_id: &str,
    user_id: &str,
    key_limits: &CostLimits,
    user_limits: &CostLimits,
    daily_mode: DailyResetMode,
    daily_reset_time: &str,
    now: DateTime<Utc>,
) -> Vec<ResolvedWindow> {
    use waypoint_core::LimitType;

    let daily_ttl = daily_ttl_secs(daily_mode, daily_reset_time, now);

    vec![
        ResolvedWindow {
            limit_type: LimitType::Total,
            counter_key: keys::quota_counter(QuotaScope::Key, key_id, QuotaWindow::Total),
            limit: limit_or_unlimited(effective(key_limits.total_usd, user_limits.total_usd)),
            ttl_secs: 0,
        },
        ResolvedWindow {
            limit_type: LimitType::FiveHour,
            counter_key: keys::quota_counter(QuotaScope::Key, key_id, QuotaWindow::FiveHour),
            limit: limit_or_unlimited(effective(key_limits.five_hour_usd, user_limits.five_hour_usd)),
            ttl_secs: FIVE_HOURS_SECS,
        },
        ResolvedWindow {
            limit_type: LimitType::FiveHour,
            counter_key: keys::quota_counter(QuotaScope::User, user_id, QuotaWindow::FiveHour),
            limit: limit_or_unlimited(user_limits.five_hour_usd),
            ttl_secs: FIVE_HOURS_SECS,
        },
        ResolvedWindow {
            limit_type: LimitType::Daily,
            counter_key: keys::quota_counter(QuotaScope::Key, key_id, QuotaWindow::Daily),
            limit: limit_or_unlimited(effective(key_limits.daily_usd, user_limits.daily_usd)),
            ttl_secs: daily_ttl,
        },
        ResolvedWindow {
            limit_type: LimitType::Daily,
            counter_key: keys::quota_counter(QuotaScope::User, user_id, QuotaWindow::Daily),
            limit: limit_or_unlimited(user_limits.daily_usd),
            ttl_secs: daily_ttl,
        },
        ResolvedWindow {
            limit_type: LimitType::Weekly,
            counter_key: keys::quota_counter(QuotaScope::Key, key_id, QuotaWindow::Weekly),
            limit: limit_or_unlimited(effective(key_limits.weekly_usd, user_limits.weekly_usd)),
            ttl_secs: WEEK_SECS,
        },
        ResolvedWindow {
            limit_type: LimitType::Weekly,
            counter_key: keys::quota_counter(QuotaScope::User, user_id, QuotaWindow::Weekly),
            limit: limit_or_unlimited(user_limits.weekly_usd),
            ttl_secs: WEEK_SECS,
        },
        ResolvedWindow {
            limit_type: LimitType::Monthly,
            counter_key: keys::quota_counter(QuotaScope::Key, key_id, QuotaWindow::Monthly),
            limit: limit_or_unlimited(effective(key_limits.monthly_usd, user_limits.monthly_usd)),
            ttl_secs: MONTH_SECS,
        },
        ResolvedWindow {
            limit_type: LimitType::Monthly,
            counter_key: keys::quota_counter(QuotaScope::User, user_id, QuotaWindow::Monthly),
            limit: limit_or_unlimited(user_limits.monthly_usd),
            ttl_secs: MONTH_SECS,
        },
    ]
}

/// Borrow the resolved windows as the `CostWindow` slice the lease script
/// expects.
#[must_use]
pub fn as_cost_windows(resolved: &[ResolvedWindow]) -> Vec<CostWindow<'_>> {
    resolved
        .iter()
        .map(|w| CostWindow {
            counter_key: &w.counter_key,
            limit: w.limit,
            ttl_secs: w.ttl_secs,
        })
        .collect()
}
