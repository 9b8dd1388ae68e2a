//! Tracks in-flight sessions: per-session concurrent-request counts, the
//! active-session set, and per-key/per-user active membership, all in Redis
//! with a TTL refreshed on activity.

use chrono::Utc;
use redis::AsyncCommands;
use waypoint_core::{ProviderId, Session, SessionId};
use waypoint_redis::{keys, RedisClient};

/// How long an idle session record survives without activity.
pub const SESSION_TTL_SECS: u64 = 4 * 3600;

/// Where a candidate session id was sourced from on the incoming request.
pub struct AssignContext<'a> {
    pub key_id: &'a str,
    pub user_id: &'a str,
    pub candidate_session_id: Option<&'a str>,
}

/// Redis-backed session tracker.
pub struct SessionTracker {
    redis: RedisClient,
}

impl SessionTracker {
    /// Wrap a Redis client.
    #[must_use]
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    /// Assign (or reuse) the session for an incoming request. The forwarder
    /// calls this once per request before dispatch.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate id is present but malformed;
    /// Redis failures degrade to "treat as a new session" with a warning.
    pub async fn assign(&self, ctx: &AssignContext<'_>) -> Session {
        let now = Utc::now();
        if let Some(candidate) = ctx.candidate_session_id {
            if crate::fingerprint::is_valid_session_id(candidate) {
                if let Some(mut existing) = self.load(candidate).await {
                    existing.last_seen = now;
                    existing.request_sequence += 1;
                    self.store(&existing).await;
                    return existing;
                }
                let session = Session {
                    id: SessionId::from(candidate.to_string()),
                    key_id: ctx.key_id.to_string().into(),
                    user_id: ctx.user_id.to_string().into(),
                    sticky_provider: None,
                    request_sequence: 1,
                    last_seen: now,
                };
                self.store(&session).await;
                return session;
            }
        }
        let session = Session {
            id: SessionId::new(),
            key_id: ctx.key_id.to_string().into(),
            user_id: ctx.user_id.to_string().into(),
            sticky_provider: None,
            request_sequence: 1,
            last_seen: now,
        };
        self.store(&session).await;
        session
    }

    /// Record which provider answered a session's first request, so follow-
    /// ups prefer it while it stays healthy.
    pub async fn set_sticky_provider(&self, session_id: &str, provider_id: &ProviderId) {
        if let Some(mut session) = self.load(session_id).await {
            session.sticky_provider = Some(provider_id.clone());
            self.store(&session).await;
        }
    }

    async fn load(&self, session_id: &str) -> Option<Session> {
        let key = keys::session_record(session_id);
        self.redis.get_json::<Session>(&key).await.ok().flatten()
    }

    async fn store(&self, session: &Session) {
        let key = keys::session_record(session.id.as_str());
        waypoint_redis::client::fire_and_forget("session_record_store", || async {
            self.redis.set_json_ex(&key, session, SESSION_TTL_SECS).await
        })
        .await;
    }

    /// Mark a session as having one more in-flight request. Must be paired
    /// with exactly one [`Self::decrement_concurrent`], even on error/abort.
    /// Skipped for `count_tokens` probe requests.
    pub async fn increment_concurrent(&self, session_id: &str) -> u64 {
        let key = keys::session_concurrent(session_id);
        match self.redis.pool().get().await {
            Ok(mut conn) => {
                let count: i64 = conn.incr(&key, 1).await.unwrap_or(1);
                let _: Result<(), _> = conn.expire(&key, i64::try_from(SESSION_TTL_SECS).unwrap_or(i64::MAX)).await;
                let _: Result<(), _> = conn.sadd(keys::session_active_set(), session_id).await;
                u64::try_from(count).unwrap_or(1)
            }
            Err(err) => {
                tracing::warn!(%session_id, %err, "session concurrency increment failed");
                1
            }
        }
    }

    /// Pair of [`Self::increment_concurrent`]; removes the session from the
    /// active set once its count reaches zero.
    pub async fn decrement_concurrent(&self, session_id: &str) {
        let key = keys::session_concurrent(session_id);
        let Ok(mut conn) = self.redis.pool().get().await else {
            return;
        };
        let count: i64 = conn.decr(&key, 1).await.unwrap_or(0);
        if count <= 0 {
            let _: Result<(), _> = conn.del(&key).await;
            let _: Result<(), _> = conn.srem(keys::session_active_set(), session_id).await;
        }
    }

    /// All currently in-flight session ids.
    pub async fn active_sessions(&self) -> Vec<String> {
        let Ok(mut conn) = self.redis.pool().get().await else {
            return Vec::new();
        };
        conn.smembers(keys::session_active_set()).await.unwrap_or_default()
    }

    /// Number of active sessions belonging to `key_id`.
    pub async fn key_session_count(&self, key_id: &str) -> u64 {
        let Ok(mut conn) = self.redis.pool().get().await else {
            return 0;
        };
        let count: i64 = conn.scard(keys::session_key_set(key_id)).await.unwrap_or(0);
        u64::try_from(count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_context_borrows_are_plain_strs() {
        let ctx = AssignContext {
            key_id: "k1",
            user_id: "u1",
            candidate_session_id: Some("01990000-0000-7000-8000-000000000000"),
        };
        assert_eq!(ctx.key_id, "k1");
    }
}
