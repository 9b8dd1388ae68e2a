//! [`Dispatcher`] over a shared `reqwest::Client`.
//!
//! `DispatchOutcome::Response` always carries a fully-buffered body: this
//! dispatcher does not stream chunks to the client as they arrive. True
//! streaming (piping upstream SSE straight through) is left for a response
//! layer sitting above the forwarder; here the whole body is read before the
//! retry loop gets to classify it, since a candidate may still fail and need
//! a retry on the next provider.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use tokio::time::timeout;
use tracing::warn;

use waypoint_forwarder::{AttemptPlan, DispatchOutcome, Dispatcher};

/// Longest body preview kept for error-text classification.
const BODY_PREVIEW_LIMIT: usize = 4096;

/// Dispatches one attempt over HTTP via a shared client.
pub struct ReqwestDispatcher {
    client: Client,
}

impl ReqwestDispatcher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Dispatcher for ReqwestDispatcher {
    async fn dispatch(&self, attempt: &AttemptPlan) -> DispatchOutcome {
        let request = self
            .client
            .post(&attempt.url)
            .headers(attempt.headers.clone())
            .body(attempt.body.clone());

        let first_byte_budget = std::time::Duration::from_millis(attempt.first_byte_timeout_ms);
        let response = match timeout(first_byte_budget, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(%err, "dispatch network error");
                return DispatchOutcome::NetworkError;
            }
            Err(_) => return DispatchOutcome::Timeout,
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let idle_budget = std::time::Duration::from_millis(attempt.idle_timeout_ms);
        let total_budget = std::time::Duration::from_millis(attempt.total_timeout_ms);
        let overall_deadline = tokio::time::Instant::now() + total_budget;

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        loop {
            let remaining = overall_deadline.saturating_duration_since(tokio::time::Instant::now());
            let chunk_budget = if attempt.streaming { idle_budget } else { remaining };
            match timeout(chunk_budget.min(remaining), stream.next()).await {
                Ok(Some(Ok(chunk))) => body.extend_from_slice(&chunk),
                Ok(Some(Err(err))) => {
                    warn!(%err, "dispatch body read error");
                    return DispatchOutcome::NetworkError;
                }
                Ok(None) => break,
                Err(_) => return DispatchOutcome::Timeout,
            }
        }

        let full_body = Bytes::from(body);
        let body_preview = String::from_utf8_lossy(
            &full_body[..full_body.len().min(BODY_PREVIEW_LIMIT)],
        )
        .into_owned();

        DispatchOutcome::Response { status, body_preview, full_body, headers }
    }
}
