//! Redis-backed primitives shared by the circuit breaker, rate limiter, and
//! session tracker: a pooled client, `cch:` keyspace helpers, pub/sub cache
//! invalidation, and the atomic lease scripts that make "check then mutate"
//! safe across concurrent requests.

pub mod client;
pub mod errors;
pub mod keys;
pub mod lease;
pub mod pubsub;

pub use client::{fire_and_forget, RedisClient};
pub use errors::RedisError;
pub use pubsub::CacheVersion;
