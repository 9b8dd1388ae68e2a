//! Error hierarchy for the request execution engine.
//!
//! Provides a structured error type system built on [`thiserror`]:
//!
//! - [`WaypointError`]: top-level enum covering every error domain the engine
//!   can surface to a client, mapped 1:1 onto an HTTP status and an
//!   [`ErrorCategory`].
//! - [`AuthError`], [`RateLimitError`], [`ProviderError`], [`ForwardError`]:
//!   domain-specific errors carrying the context needed to build a response
//!   body and a log line.
//! - [`ErrorCollector`]: accumulates errors from fire-and-forget bookkeeping
//!   operations (Redis writes, alert dispatch) without failing the request.
//!
//! The error classification utilities in [`parse`] turn raw upstream error
//! text into a [`parse::ErrorCategory`] used by the forwarder's retry logic.

pub mod parse;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP-facing error kind. Every [`WaypointError`] variant maps to exactly one
/// of these so the HTTP layer never has to inspect error internals to pick a
/// status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Missing or invalid credentials.
    Unauthorized,
    /// Authenticated but not permitted.
    PermissionDenied,
    /// A rate-limit window was exceeded.
    RateLimitExceeded,
    /// Content gate rejected the payload.
    BlockedBySensitiveWord,
    /// No enabled, healthy provider could serve the request.
    NoProviderAvailable,
    /// Strict endpoint policy found no candidate endpoint.
    EndpointPoolExhausted,
    /// The upstream provider returned an error after retries were exhausted.
    UpstreamError,
    /// The upstream returned a 200 that does not look like a real success.
    FakeSuccess,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// The HTTP status code this error kind is reported as.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::PermissionDenied => 403,
            Self::RateLimitExceeded => 429,
            Self::BlockedBySensitiveWord => 451,
            Self::NoProviderAvailable | Self::EndpointPoolExhausted => 503,
            Self::UpstreamError => 502,
            Self::FakeSuccess => 502,
            Self::Internal => 500,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WaypointError — top-level error enum
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for the request execution engine.
///
/// Every variant can be classified by [`ErrorKind`] for HTTP status mapping
/// and carries enough context to build both the i18n-keyed client body and
/// the verbose log line (only shown to clients when `verbose_provider_error`
/// is enabled).
#[derive(Debug, Error)]
pub enum WaypointError {
    /// Authentication failure.
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Rate limit or quota violation.
    #[error("{0}")]
    RateLimit(#[from] RateLimitError),

    /// Content was blocked by a sensitive-word gate.
    #[error("request blocked: {reason}")]
    ContentBlocked {
        /// Human-readable reason (not shown to the client unless verbose).
        reason: String,
    },

    /// Provider selection or forwarding failure.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// Storage-layer failure.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// Generic internal error with structured context.
    #[error("[{code}] {message}")]
    Internal {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message (log-only).
        message: String,
    },
}

impl WaypointError {
    /// Classify this error into the HTTP-facing [`ErrorKind`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(e) => e.kind(),
            Self::RateLimit(_) => ErrorKind::RateLimitExceeded,
            Self::ContentBlocked { .. } => ErrorKind::BlockedBySensitiveWord,
            Self::Provider(e) => e.kind(),
            Self::Storage(_) | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// The HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    /// Build an internal error from any displayable source.
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AuthError
// ─────────────────────────────────────────────────────────────────────────────

/// Authentication and authorization failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization`, `x-api-key`, or `x-goog-api-key` header was present.
    #[error("missing credentials")]
    MissingCredentials,

    /// The key does not match the expected `sk-<32 hex>` shape.
    #[error("malformed key")]
    MalformedKey,

    /// The key was not found, is disabled, or has expired.
    #[error("key not found or inactive: {key_id}")]
    KeyInactive {
        /// The key id that failed, for logs only.
        key_id: String,
    },

    /// The authenticated subject lacks permission for the requested resource.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Human-readable reason.
        reason: String,
    },
}

impl AuthError {
    /// Classify into an [`ErrorKind`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredentials | Self::MalformedKey | Self::KeyInactive { .. } => {
                ErrorKind::Unauthorized
            }
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RateLimitError
// ─────────────────────────────────────────────────────────────────────────────

/// The dimension a rate limit check was evaluated against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    /// Requests per minute.
    Rpm,
    /// Concurrent in-flight sessions.
    Concurrency,
    /// Lifetime total cost (never clock-resets).
    Total,
    /// Rolling 5-hour cost window.
    FiveHour,
    /// Daily cost window (fixed or rolling).
    Daily,
    /// Weekly cost window.
    Weekly,
    /// Monthly cost window.
    Monthly,
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rpm => "rpm",
            Self::Concurrency => "concurrency",
            Self::Total => "total",
            Self::FiveHour => "five_hour",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

/// A rate limit or quota violation, carrying the fields the client needs to
/// decide when to retry.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[error("rate limit exceeded: {limit_type} ({current} > {limit})")]
pub struct RateLimitError {
    /// Which window was violated.
    pub limit_type: LimitType,
    /// The value that triggered the rejection.
    pub current: f64,
    /// The configured limit.
    pub limit: f64,
    /// When the window resets, if known (fixed windows only).
    pub reset_at: Option<chrono::DateTime<chrono::Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ProviderError
// ─────────────────────────────────────────────────────────────────────────────

/// Provider selection, endpoint resolution, and forwarding failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Every candidate provider was filtered out (disabled, circuit open,
    /// group mismatch, rate limited).
    #[error("no provider available for this request")]
    NoProviderAvailable,

    /// The strict endpoint policy found no usable endpoint and the path does
    /// not allow falling back to a legacy `provider.url`.
    #[error("endpoint pool exhausted: {cause}")]
    EndpointPoolExhausted {
        /// Why the pool was empty.
        cause: String,
    },

    /// All retries against upstream providers were exhausted.
    #[error("upstream error after {attempts} attempt(s): {message}")]
    UpstreamExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last upstream error message (verbose-gated on response).
        message: String,
        /// Last upstream HTTP status, if any.
        status: Option<u16>,
    },

    /// The upstream returned a 200 with an empty or error-shaped body.
    #[error("fake success response: {reason}")]
    FakeSuccess {
        /// Why this was classified as fake.
        reason: String,
    },
}

impl ProviderError {
    /// Classify into an [`ErrorKind`].
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProviderAvailable => ErrorKind::NoProviderAvailable,
            Self::EndpointPoolExhausted { .. } => ErrorKind::EndpointPoolExhausted,
            Self::UpstreamExhausted { .. } => ErrorKind::UpstreamError,
            Self::FakeSuccess { .. } => ErrorKind::FakeSuccess,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StorageError
// ─────────────────────────────────────────────────────────────────────────────

/// Database / cache storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying connection pool or driver failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A row was expected but not found.
    #[error("not found: {0}")]
    NotFound(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// ErrorCollector
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates errors from fire-and-forget operations (Redis writes, alert
/// dispatch, metrics publishing) so a single failure never aborts a request,
/// while still making failures observable in logs and tests.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<String>,
}

impl ErrorCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error, logging it at `warn` level.
    pub fn record(&mut self, context: &str, error: impl fmt::Display) {
        let line = format!("{context}: {error}");
        tracing::warn!(%line, "non-fatal error recorded");
        self.errors.push(line);
    }

    /// Whether any errors were recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// All recorded error lines, in recording order.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401() {
        let err = WaypointError::Auth(AuthError::MissingCredentials);
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn rate_limit_maps_to_429() {
        let err = WaypointError::RateLimit(RateLimitError {
            limit_type: LimitType::Daily,
            current: 20.0,
            limit: 10.0,
            reset_at: None,
        });
        assert_eq!(err.http_status(), 429);
    }

    #[test]
    fn content_blocked_maps_to_451() {
        let err = WaypointError::ContentBlocked {
            reason: "matched sensitive word list".into(),
        };
        assert_eq!(err.http_status(), 451);
    }

    #[test]
    fn no_provider_available_maps_to_503() {
        let err = WaypointError::Provider(ProviderError::NoProviderAvailable);
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn endpoint_pool_exhausted_maps_to_503() {
        let err = WaypointError::Provider(ProviderError::EndpointPoolExhausted {
            cause: "no_enabled_endpoints".into(),
        });
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn upstream_exhausted_maps_to_502() {
        let err = WaypointError::Provider(ProviderError::UpstreamExhausted {
            attempts: 3,
            message: "connection reset".into(),
            status: None,
        });
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn fake_success_maps_to_502() {
        let err = WaypointError::Provider(ProviderError::FakeSuccess {
            reason: "empty body".into(),
        });
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn internal_maps_to_500() {
        let err = WaypointError::internal("BOOT_FAIL", "could not reach database");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn limit_type_display() {
        assert_eq!(LimitType::FiveHour.to_string(), "five_hour");
        assert_eq!(LimitType::Rpm.to_string(), "rpm");
    }

    #[test]
    fn rate_limit_error_serde_roundtrip() {
        let err = RateLimitError {
            limit_type: LimitType::Weekly,
            current: 5.0,
            limit: 4.0,
            reset_at: None,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: RateLimitError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.limit_type, LimitType::Weekly);
    }

    #[test]
    fn error_collector_accumulates() {
        let mut collector = ErrorCollector::new();
        assert!(!collector.has_errors());
        collector.record("redis_write", "connection refused");
        collector.record("alert_dispatch", "timeout");
        assert!(collector.has_errors());
        assert_eq!(collector.errors().len(), 2);
    }
}
