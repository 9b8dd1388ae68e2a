//! Errors surfaced by the forwarder's public entry point.

use waypoint_core::{ErrorCategory, ProviderChainItem};

/// Why the forwarder gave up without a usable response.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// No provider was left to try, either at the start or after retries.
    #[error("no provider available: {0}")]
    NoProviderAvailable(String),

    /// Every attempted provider/endpoint failed; `chain` records why.
    #[error("upstream exhausted after {} attempt(s)", .chain.len())]
    UpstreamExhausted {
        /// Full per-attempt audit trail, in attempt order.
        chain: Vec<ProviderChainItem>,
    },

    /// An attempt returned a non-retryable client error; the client's
    /// request itself is invalid, so retrying elsewhere won't help.
    #[error("client error on attempt {attempt}: {message}")]
    ClientError {
        /// 1-based attempt number the error was surfaced on.
        attempt: u32,
        /// Redacted error message from upstream.
        message: String,
        /// Status code upstream returned, if any.
        status: Option<u16>,
    },

    /// The caller's cancellation token fired mid-dispatch.
    #[error("request cancelled")]
    Cancelled,

    /// A downstream dependency (circuit breaker store, selector) failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ForwardError {
    /// The [`ErrorCategory`] to record for this failure, mirroring what the
    /// last chain item (if any) already carries.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoProviderAvailable(_) => ErrorCategory::ConcurrentLimitFailed,
            Self::UpstreamExhausted { chain } => chain
                .last()
                .map(|item| item.error_category)
                .unwrap_or(ErrorCategory::ProviderError),
            Self::ClientError { .. } => ErrorCategory::ClientErrorNonRetryable,
            Self::Cancelled | Self::Internal(_) => ErrorCategory::SystemError,
        }
    }

    /// HTTP status the gateway should answer the client with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoProviderAvailable(_) => 503,
            Self::UpstreamExhausted { .. } => 502,
            Self::ClientError { status, .. } => status.unwrap_or(400),
            Self::Cancelled => 499,
            Self::Internal(_) => 500,
        }
    }
}
