//! # waypoint-core
//!
//! Foundation types shared by every crate in the waypoint reverse proxy:
//!
//! - **Branded IDs** ([`ids`]): `ProviderId`, `EndpointId`, `KeyId`, `UserId`,
//!   `SessionId`, `RequestId`, `LeaseId` as newtypes for type safety.
//! - **Domain vocabulary** ([`domain`]): `Provider`, `ProviderEndpoint`,
//!   `Key`, `User`, `Session`, `CircuitBreakerState`, `ProviderChainItem`.
//! - **Errors** ([`errors`]): `WaypointError` hierarchy via `thiserror`,
//!   mapped onto HTTP status codes, plus upstream error text classification.
//! - **Retry math** ([`retry`]): backoff calculation, `Retry-After` parsing.

#![deny(unsafe_code)]

pub mod constants;
pub mod domain;
pub mod errors;
pub mod ids;
pub mod retry;

pub use domain::{
    CandidateSnapshot, CircuitBreakerConfig, CircuitBreakerState, CircuitState, CostLimits,
    DailyResetMode, DecisionContext, EndpointFilterStats, ErrorCategory, FilteredProvider, Key,
    Provider, ProviderChainItem, ProviderEndpoint, ProviderType, Role, Session, User, WireFormat,
};
pub use errors::{AuthError, ErrorCollector, ErrorKind, LimitType, ProviderError, RateLimitError, StorageError, WaypointError};
pub use ids::{EndpointId, KeyId, LeaseId, ProviderId, RequestId, SessionId, UserId};
