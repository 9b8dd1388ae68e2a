//! Pooled Redis connection handle and the fire-and-forget write helper.

use std::future::Future;

use deadpool_redis::{Config, Runtime};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::RedisError;

/// Pooled Redis client shared across the process.
///
/// Wraps a `deadpool_redis::Pool`; cloning is cheap (the pool is an `Arc`
/// internally).
#[derive(Clone)]
pub struct RedisClient {
    pool: deadpool_redis::Pool,
}

impl RedisClient {
    /// Build a client from a `redis://` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the pool cannot be created.
    pub fn connect(url: &str) -> Result<Self, RedisError> {
        let cfg = Config::from_url(url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    /// Borrow the underlying pool, for callers (lease scripts) that need a
    /// raw connection.
    #[must_use]
    pub fn pool(&self) -> &deadpool_redis::Pool {
        &self.pool
    }

    /// Liveness check used by the `/ready` endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be acquired or `PING` fails.
    pub async fn ping(&self) -> Result<(), RedisError> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Store a JSON-serializable value with a TTL.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure, command failure, or encode
    /// failure.
    pub async fn set_json_ex<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), RedisError> {
        let payload = serde_json::to_string(value)?;
        let mut conn = self.pool.get().await?;
        let () = conn.set_ex(key, payload, ttl_secs).await?;
        Ok(())
    }

    /// Store a JSON-serializable value with no expiry.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure, command failure, or encode
    /// failure.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), RedisError> {
        let payload = serde_json::to_string(value)?;
        let mut conn = self.pool.get().await?;
        let () = conn.set(key, payload).await?;
        Ok(())
    }

    /// Load and decode a JSON value, if present.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure, command failure, or decode
    /// failure.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RedisError> {
        let mut conn = self.pool.get().await?;
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(RedisError::from))
            .transpose()
    }

    /// Publish a message on a pub/sub channel.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or command failure.
    pub async fn publish(&self, channel: &str, message: &str) -> Result<(), RedisError> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.publish(channel, message).await?;
        Ok(())
    }
}

/// Run a fire-and-forget Redis write: log on error, never propagate.
///
/// Used for operations the spec classifies as best-effort (circuit-breaker
/// persistence, session activity bumps). Never use this for the lease
/// reconciliation path, which must be awaited and its errors surfaced.
pub async fn fire_and_forget<F, Fut>(context: &str, op: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), RedisError>>,
{
    if let Err(err) = op().await {
        tracing::warn!(%context, %err, "fire-and-forget redis write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_rejects_malformed_url() {
        let result = RedisClient::connect("not-a-url");
        assert!(result.is_err());
    }
}
