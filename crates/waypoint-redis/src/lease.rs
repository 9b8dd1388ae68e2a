//! Atomic lease protocols backed by Redis Lua scripts.
//!
//! Two protocols live here: the cost-window lease (reserve, then reconcile
//! against actual cost) and the session-concurrency check-and-track. Both
//! need "check every dimension, then mutate all of them" to be atomic across
//! concurrent requests, which is why they're scripts rather than a sequence
//! of separate commands.

use redis::Script;

use crate::errors::RedisError;

/// Outcome of [`check_and_reserve_cost`].
#[derive(Clone, Debug, PartialEq)]
pub enum CostLeaseOutcome {
    /// Every window had headroom; the reserve was applied to all of them.
    Granted,
    /// The window at this index (into the `windows` slice passed in) would
    /// have been exceeded; nothing was mutated.
    Denied { window_index: usize },
}

const CHECK_AND_RESERVE_COST: &str = r"
local n = #KEYS
local reserve = tonumber(ARGV[1])
for i = 1, n do
    local current = tonumber(redis.call('GET', KEYS[i]) or '0')
    local limit = tonumber(ARGV[1 + i])
    if limit > 0 and (current + reserve) > limit then
        return i - 1
    end
end
for i = 1, n do
    redis.call('INCRBYFLOAT', KEYS[i], reserve)
    local ttl = tonumber(ARGV[1 + n + i])
    if ttl > 0 then
        redis.call('EXPIRE', KEYS[i], ttl)
    end
end
return -1
";

/// One cost window to check as part of a reservation.
pub struct CostWindow<'a> {
    /// The `cch:quota:...` counter key.
    pub counter_key: &'a str,
    /// The configured limit for this window. `<= 0` means unlimited.
    pub limit: f64,
    /// TTL to (re)apply to the counter after incrementing. `0` leaves it as
    /// is (used for `total`, which never expires).
    pub ttl_secs: i64,
}

/// Atomically check every window in `windows` against `reserve` and, if all
/// pass, add `reserve` to each counter.
///
/// # Errors
///
/// Returns an error on connection or command failure.
pub async fn check_and_reserve_cost(
    conn: &mut deadpool_redis::Connection,
    windows: &[CostWindow<'_>],
    reserve: f64,
) -> Result<CostLeaseOutcome, RedisError> {
    let script = Script::new(CHECK_AND_RESERVE_COST);
    let mut invocation = script.prepare_invoke();
    for window in windows {
        let _ = invocation.key(window.counter_key);
    }
    let _ = invocation.arg(reserve);
    for window in windows {
        let _ = invocation.arg(window.limit);
    }
    for window in windows {
        let _ = invocation.arg(window.ttl_secs);
    }

    let result: i64 = invocation.invoke_async(conn).await?;
    if result < 0 {
        Ok(CostLeaseOutcome::Granted)
    } else {
        Ok(CostLeaseOutcome::Denied {
            window_index: usize::try_from(result).unwrap_or(0),
        })
    }
}

const RECONCILE_COST: &str = r"
local adjustment = tonumber(ARGV[1])
for i = 1, #KEYS do
    redis.call('INCRBYFLOAT', KEYS[i], adjustment)
end
return 1
";

/// Apply `actual_cost - reserved` to every counter that was reserved
/// against. Must be awaited; never run as fire-and-forget.
///
/// # Errors
///
/// Returns an error on connection or command failure.
pub async fn reconcile_cost_lease(
    conn: &mut deadpool_redis::Connection,
    counter_keys: &[&str],
    reserved: f64,
    actual_cost: f64,
) -> Result<(), RedisError> {
    let adjustment = actual_cost - reserved;
    let script = Script::new(RECONCILE_COST);
    let mut invocation = script.prepare_invoke();
    for key in counter_keys {
        let _ = invocation.key(*key);
    }
    let _ = invocation.arg(adjustment);
    let _: i64 = invocation.invoke_async(conn).await?;
    Ok(())
}

/// Outcome of [`check_and_track_concurrency`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConcurrencyOutcome {
    /// Both limits had headroom; the session id was added to both sets.
    Admitted,
    /// The key-scoped limit was reached.
    KeyLimitReached,
    /// The user-scoped limit was reached.
    UserLimitReached,
}

const CHECK_AND_TRACK_CONCURRENCY: &str = r"
local session_id = ARGV[1]
local key_limit = tonumber(ARGV[2])
local user_limit = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local effective_key_limit = key_limit
if effective_key_limit == 0 then
    effective_key_limit = user_limit
end

if effective_key_limit > 0 and redis.call('SCARD', KEYS[1]) >= effective_key_limit then
    return 'key'
end
if user_limit > 0 and redis.call('SCARD', KEYS[2]) >= user_limit then
    return 'user'
end

redis.call('SADD', KEYS[1], session_id)
redis.call('EXPIRE', KEYS[1], ttl)
redis.call('SADD', KEYS[2], session_id)
redis.call('EXPIRE', KEYS[2], ttl)
return 'ok'
";

/// Atomically check the key- and user-scoped concurrent-session limits and,
/// if both pass, admit `session_id` into both sets.
///
/// Key-concurrency falls back to the user's limit when the key's own limit
/// is `0` ("inherit").
///
/// # Errors
///
/// Returns an error on connection or command failure.
pub async fn check_and_track_concurrency(
    conn: &mut deadpool_redis::Connection,
    key_set_key: &str,
    user_set_key: &str,
    session_id: &str,
    key_limit: u32,
    user_limit: u32,
    ttl_secs: u64,
) -> Result<ConcurrencyOutcome, RedisError> {
    let result: String = Script::new(CHECK_AND_TRACK_CONCURRENCY)
        .key(key_set_key)
        .key(user_set_key)
        .arg(session_id)
        .arg(key_limit)
        .arg(user_limit)
        .arg(ttl_secs)
        .invoke_async(conn)
        .await?;

    Ok(match result.as_str() {
        "key" => ConcurrencyOutcome::KeyLimitReached,
        "user" => ConcurrencyOutcome::UserLimitReached,
        _ => ConcurrencyOutcome::Admitted,
    })
}

/// Remove a finished session from both concurrency sets. Safe to call even
/// if the session was never admitted.
///
/// # Errors
///
/// Returns an error on connection or command failure.
pub async fn release_concurrency(
    conn: &mut deadpool_redis::Connection,
    key_set_key: &str,
    user_set_key: &str,
    session_id: &str,
) -> Result<(), RedisError> {
    use redis::AsyncCommands;
    let _: i64 = conn.srem(key_set_key, session_id).await?;
    let _: i64 = conn.srem(user_set_key, session_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_lease_outcome_equality() {
        assert_eq!(CostLeaseOutcome::Granted, CostLeaseOutcome::Granted);
        assert_ne!(
            CostLeaseOutcome::Denied { window_index: 0 },
            CostLeaseOutcome::Granted
        );
    }

    #[test]
    fn concurrency_outcome_variants_distinct() {
        assert_ne!(
            ConcurrencyOutcome::Admitted,
            ConcurrencyOutcome::KeyLimitReached
        );
        assert_ne!(
            ConcurrencyOutcome::KeyLimitReached,
            ConcurrencyOutcome::UserLimitReached
        );
    }
}
