//! Pub/sub-driven cache invalidation.
//!
//! The circuit-breaker config cache (and the system-settings / provider
//! catalog caches) are in-process, TTL'd, and invalidated by a monotonic
//! version counter bumped whenever a message arrives on the matching
//! channel. A concurrent load-in-flight compares its captured version
//! against the current one after completing and re-loads once on mismatch,
//! so a stale load can never clobber a fresh invalidation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use redis::AsyncCommands;

use crate::errors::RedisError;

/// A monotonic counter bumped on every invalidation message for one channel.
#[derive(Clone, Default)]
pub struct CacheVersion(Arc<AtomicU64>);

impl CacheVersion {
    /// Start at version 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current version.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Bump and return the new version.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Run a pub/sub subscription loop that bumps `version` on every message
/// received on `channel`. Intended to be spawned as a long-lived background
/// task and run until the process shuts down or the Redis connection drops.
///
/// # Errors
///
/// Returns an error if the dedicated pub/sub connection cannot be
/// established. Once subscribed, per-message errors are logged and the loop
/// continues; a dropped connection ends the loop with an error so the
/// caller can decide whether to reconnect.
pub async fn run_invalidation_subscriber(
    redis_url: &str,
    channel: &str,
    version: CacheVersion,
) -> Result<(), RedisError> {
    let client = redis::Client::open(redis_url)?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = msg.get_payload().unwrap_or_default();
        tracing::debug!(%channel, %payload, "cache invalidation received");
        let _ = version.bump();
    }

    Ok(())
}

/// Publish an invalidation message on `channel`. Best-effort: failures
/// should be wrapped in [`crate::client::fire_and_forget`] by the caller.
///
/// # Errors
///
/// Returns an error on connection or command failure.
pub async fn broadcast(
    conn: &mut deadpool_redis::Connection,
    channel: &str,
    payload: &str,
) -> Result<(), RedisError> {
    let _: i64 = conn.publish(channel, payload).await?;
    Ok(())
}
