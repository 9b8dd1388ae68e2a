//! Redis-persisted, in-process-cached circuit breaker service.
//!
//! One [`Breaker`] instance is shared for providers and for endpoints; only
//! the Redis key-builder differs, since the semantics are identical per the
//! spec ("endpoint circuit breaker: identical semantics per endpoint id,
//! with a separate Redis keyspace").

use chrono::Utc;
use dashmap::DashMap;
use waypoint_core::{CircuitBreakerConfig, CircuitBreakerState, CircuitState};
use waypoint_redis::{client::fire_and_forget, RedisClient};

use crate::state_machine;

/// Builds the Redis key for a given target id.
pub type KeyBuilder = fn(&str) -> String;

/// A circuit breaker keyed by arbitrary string ids (provider or endpoint),
/// backed by Redis with an in-process read cache.
pub struct Breaker {
    redis: RedisClient,
    cache: DashMap<String, CircuitBreakerState>,
    key_builder: KeyBuilder,
}

impl Breaker {
    /// Construct a breaker over the provider keyspace.
    #[must_use]
    pub fn for_providers(redis: RedisClient) -> Self {
        Self::new(redis, waypoint_redis::keys::circuit_breaker_provider)
    }

    /// Construct a breaker over the endpoint keyspace.
    #[must_use]
    pub fn for_endpoints(redis: RedisClient) -> Self {
        Self::new(redis, waypoint_redis::keys::circuit_breaker_endpoint)
    }

    fn new(redis: RedisClient, key_builder: KeyBuilder) -> Self {
        Self {
            redis,
            cache: DashMap::new(),
            key_builder,
        }
    }

    /// Load the state for `id`, re-syncing from Redis when the cached copy
    /// is anything other than closed (Redis is the source of truth for
    /// non-closed states so admin resets propagate across instances).
    async fn load(&self, id: &str) -> CircuitBreakerState {
        if let Some(cached) = self.cache.get(id) {
            if cached.state == CircuitState::Closed {
                return *cached;
            }
        }

        let key = (self.key_builder)(id);
        let fetched = self.redis.get_json::<CircuitBreakerState>(&key).await;
        let state = match fetched {
            Ok(Some(state)) => state,
            Ok(None) => CircuitBreakerState::default(),
            Err(err) => {
                tracing::warn!(%id, %err, "circuit breaker redis read failed, defaulting to closed");
                CircuitBreakerState::default()
            }
        };
        let _ = self.cache.insert(id.to_string(), state);
        state
    }

    fn store(&self, id: &str, state: CircuitBreakerState) {
        let _ = self.cache.insert(id.to_string(), state);
    }

    async fn persist(&self, id: &str, state: CircuitBreakerState) {
        let key = (self.key_builder)(id);
        let redis = self.redis.clone();
        fire_and_forget("circuit_breaker_persist", || async move {
            redis.set_json(&key, &state).await
        })
        .await;
    }

    /// Whether requests against `id` are currently blocked.
    pub async fn is_open(&self, id: &str) -> bool {
        let mut state = self.load(id).await;
        let now = Utc::now();
        let was_open = state.state == CircuitState::Open;
        let open = state_machine::is_open(&mut state, now);
        self.store(id, state);
        if was_open && !open {
            self.persist(id, state).await;
        }
        open
    }

    /// Record a failed attempt against `id`.
    pub async fn record_failure(&self, id: &str, config: &CircuitBreakerConfig) {
        let mut state = self.load(id).await;
        let now = Utc::now();
        let was_open = state.state == CircuitState::Open;
        let changed = state_machine::record_failure(&mut state, config, now);
        self.store(id, state);
        if changed {
            if !was_open && state.state == CircuitState::Open {
                tracing::warn!(%id, "circuit breaker opened");
            }
            self.persist(id, state).await;
        }
    }

    /// Record a successful attempt against `id`.
    pub async fn record_success(&self, id: &str, config: &CircuitBreakerConfig) {
        let mut state = self.load(id).await;
        let changed = state_machine::record_success(&mut state, config);
        self.store(id, state);
        if changed {
            self.persist(id, state).await;
        }
    }

    /// Admin reset: force closed.
    pub async fn reset(&self, id: &str) {
        let mut state = self.load(id).await;
        state_machine::reset(&mut state);
        self.store(id, state);
        self.persist(id, state).await;
    }

    /// Smart-probe trip: `open -> half-open` only.
    pub async fn trip_to_half_open(&self, id: &str) {
        let mut state = self.load(id).await;
        if state_machine::trip_to_half_open(&mut state) {
            self.store(id, state);
            self.persist(id, state).await;
        }
    }

    /// Force closed, used when an admin disables the breaker entirely.
    pub async fn force_close(&self, id: &str) {
        let mut state = self.load(id).await;
        state_machine::force_close(&mut state);
        self.store(id, state);
        self.persist(id, state).await;
    }
}
