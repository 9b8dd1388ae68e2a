//! Circuit breaker state machine, Redis-backed persistence, config caching,
//! and the vendor+type fuse.
//!
//! [`state_machine`] holds the pure closed/open/half-open transition rules;
//! [`Breaker`] wraps them with Redis persistence and an in-process cache,
//! shared by the per-provider and per-endpoint breakers. [`ConfigCache`]
//! handles the 5-minute TTL'd, coalesced config lookups the breaker needs
//! per provider. [`FuseTracker`] is the coarser `(vendorId, providerType)`
//! kill-switch.

pub mod breaker;
pub mod config_cache;
pub mod fuse;
pub mod state_machine;

pub use breaker::Breaker;
pub use config_cache::{ConfigCache, ConfigLoader};
pub use fuse::{FuseRecord, FuseState, FuseTracker};
