//! # waypoint-logging
//!
//! Structured logging with `tracing` and an optional `SQLite` transport.
//!
//! [`init_subscriber`] wires up the global `tracing` subscriber according to
//! `WAYPOINT_LOG_FORMAT`/`WAYPOINT_LOG_LEVEL` (pretty-for-a-TTY vs.
//! newline-delimited JSON for aggregation). [`redact_header_value`] is used by
//! the forwarder before any upstream request/response header is written to a
//! log line or audit record, so provider credentials never reach disk.

#![deny(unsafe_code)]

pub mod transport;
pub mod types;

pub use transport::{SqliteTransport, TransportConfig, TransportHandle};
pub use types::{LogEntry, LogLevel, LogQueryOptions};

use tracing_subscriber::EnvFilter;

/// Output format for the global subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colorized when attached to a TTY.
    Pretty,
    /// Newline-delimited JSON, one object per event.
    Json,
}

/// Install the global `tracing` subscriber.
///
/// `filter` is an `EnvFilter`-style directive string (e.g. `"info"` or
/// `"waypoint_forwarder=debug,info"`).
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init_subscriber(
    format: LogFormat,
    filter: &str,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
}

/// Header names whose values must never be logged or written to an audit
/// record verbatim.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "x-goog-api-key",
    "proxy-authorization",
    "cookie",
    "set-cookie",
];

/// Redact a header value for logging, keeping only a short prefix so the
/// credential's shape (and whether it rotated) is still visible.
///
/// Non-sensitive headers are passed through unchanged.
#[must_use]
pub fn redact_header_value(name: &str, value: &str) -> String {
    if SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
        redact_secret(value)
    } else {
        value.to_string()
    }
}

/// Redact an arbitrary secret string, keeping a short prefix for correlation
/// in logs without exposing the credential itself.
#[must_use]
pub fn redact_secret(value: &str) -> String {
    let keep = 6.min(value.len());
    format!("{}***redacted***", &value[..keep])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_known_sensitive_headers() {
        assert_eq!(
            redact_header_value("Authorization", "Bearer sk-ant-abcdef123456"),
            "Bearer***redacted***"
        );
        assert_eq!(
            redact_header_value("x-api-key", "sk-live-abcdef"),
            "sk-liv***redacted***"
        );
    }

    #[test]
    fn passes_through_non_sensitive_headers() {
        assert_eq!(
            redact_header_value("content-type", "application/json"),
            "application/json"
        );
    }

    #[test]
    fn redact_secret_handles_short_values() {
        assert_eq!(redact_secret("ab"), "ab***redacted***");
    }

    #[test]
    fn header_match_is_case_insensitive() {
        assert_eq!(
            redact_header_value("X-GOOG-API-KEY", "abcdefghij"),
            "abcdef***redacted***"
        );
    }
}
