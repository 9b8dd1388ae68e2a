//! Maps a dispatch outcome to the forwarder's retry classification.
//!
//! Network-level failures are classified directly; upstream HTTP responses
//! are classified by status code first, then by the response body text via
//! [`waypoint_core::errors::parse`], which carries the richer auth/quota/
//! rate-limit pattern table shared with the rest of the engine.

use waypoint_core::errors::parse::{self, ErrorCategory as ParsedCategory};
use waypoint_core::ErrorCategory;

/// The outcome of classifying one attempt, before a [`ProviderChainItem`] is
/// built from it.
///
/// [`ProviderChainItem`]: waypoint_core::ProviderChainItem
pub struct Classification {
    pub category: ErrorCategory,
    pub retryable: bool,
    /// `reason` as recorded on the chain item.
    pub reason: &'static str,
}

impl Classification {
    fn success() -> Self {
        Self { category: ErrorCategory::None, retryable: false, reason: "request_success" }
    }
}

/// Classify a network-level failure (connect/timeout/TLS) before any
/// response was received.
#[must_use]
pub fn classify_network_error() -> Classification {
    Classification { category: ErrorCategory::SystemError, retryable: true, reason: "system_error" }
}

/// Classify a timed-out attempt (per-attempt deadline elapsed).
#[must_use]
pub fn classify_timeout() -> Classification {
    Classification { category: ErrorCategory::SystemError, retryable: true, reason: "system_error" }
}

/// Classify a completed upstream response by status code and body text.
#[must_use]
pub fn classify_response(status: u16, body_preview: &str) -> Classification {
    if (200..300).contains(&status) {
        return Classification::success();
    }

    let parsed = parse::parse_error(body_preview);

    match parsed.category {
        ParsedCategory::Authentication | ParsedCategory::Authorization | ParsedCategory::Quota => {
            Classification {
                category: ErrorCategory::ClientErrorNonRetryable,
                retryable: false,
                reason: "client_error_non_retryable",
            }
        }
        ParsedCategory::InvalidRequest => {
            if status == 429 || status >= 500 {
                Classification { category: ErrorCategory::ProviderError, retryable: true, reason: "retry_failed" }
            } else {
                Classification {
                    category: ErrorCategory::ClientErrorNonRetryable,
                    retryable: false,
                    reason: "client_error_non_retryable",
                }
            }
        }
        ParsedCategory::RateLimit | ParsedCategory::Server => {
            Classification { category: ErrorCategory::ProviderError, retryable: true, reason: "retry_failed" }
        }
        ParsedCategory::Network => {
            Classification { category: ErrorCategory::SystemError, retryable: true, reason: "system_error" }
        }
        ParsedCategory::Unknown => {
            // Fall back to a plain status-code table when the body text
            // carries no recognizable pattern (e.g. a truncated body).
            status_fallback(status)
        }
    }
}

fn status_fallback(status: u16) -> Classification {
    match status {
        400 => Classification {
            category: ErrorCategory::ClientErrorNonRetryable,
            retryable: false,
            reason: "client_error_non_retryable",
        },
        408 | 429 => Classification { category: ErrorCategory::ProviderError, retryable: true, reason: "retry_failed" },
        401 | 403 => Classification {
            category: ErrorCategory::ClientErrorNonRetryable,
            retryable: false,
            reason: "client_error_non_retryable",
        },
        s if s >= 500 => Classification { category: ErrorCategory::ProviderError, retryable: true, reason: "retry_failed" },
        _ => Classification {
            category: ErrorCategory::ClientErrorNonRetryable,
            retryable: false,
            reason: "client_error_non_retryable",
        },
    }
}
