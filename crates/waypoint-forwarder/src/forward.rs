//! The forwarder: drives one request across providers and endpoints,
//! retrying on retryable failures until success or exhaustion.

use std::time::Instant;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use waypoint_circuitbreaker::{Breaker, FuseTracker};
use waypoint_core::{
    CircuitState, DecisionContext, ErrorCategory, EndpointId, Provider, ProviderChainItem,
    ProviderEndpoint, ProviderId,
};
use waypoint_selector::endpoint_resolver::{self, EndpointResolutionError, Resolution};
use waypoint_selector::provider_selector::{self, HealthGates, Selection, SelectionRequest};

use crate::classify::{classify_network_error, classify_response, classify_timeout, Classification};
use crate::errors::ForwardError;
use crate::headers::{build_outbound, redact_url, OutboundAuth};
use crate::types::{AttemptPlan, DispatchOutcome, Dispatcher, ForwardRequest, ForwardSuccess};

/// Resolves the endpoint pool and credential for a given provider; kept as a
/// narrow trait so the loop doesn't depend on a concrete storage crate.
#[async_trait::async_trait]
pub trait ProviderContext: Send + Sync {
    /// Endpoints configured for this provider's `(vendor_id, provider_type)` pool.
    async fn endpoints_for(&self, provider: &Provider) -> Vec<ProviderEndpoint>;
    /// The credential to present for this provider.
    async fn credential_for(&self, provider: &Provider) -> Option<String>;
}

/// Drives a single request across providers and endpoints.
pub struct Forwarder<D: Dispatcher, C: ProviderContext> {
    provider_breaker: Breaker,
    endpoint_breaker: Breaker,
    fuse: FuseTracker,
    dispatcher: D,
    context: C,
}

/// One resolved-and-dispatched attempt, before it's folded into the chain.
enum AttemptResult {
    Success(ProviderChainItem, u16, reqwest::header::HeaderMap, bytes::Bytes),
    Retry(ProviderChainItem),
    ClientError(ProviderChainItem, String, Option<u16>),
    StrictBlock(ProviderChainItem),
}

impl<D: Dispatcher, C: ProviderContext> Forwarder<D, C> {
    #[must_use]
    pub fn new(
        provider_breaker: Breaker,
        endpoint_breaker: Breaker,
        fuse: FuseTracker,
        dispatcher: D,
        context: C,
    ) -> Self {
        Self { provider_breaker, endpoint_breaker, fuse, dispatcher, context }
    }

    /// Run `request` to completion, retrying across candidates until
    /// success, exhaustion, or a non-retryable client error.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError`] when no provider is selectable, every
    /// attempted candidate fails, or the cancellation token fires.
    pub async fn forward(
        &self,
        request: &ForwardRequest,
        catalog: &[Provider],
        cancel: &CancellationToken,
        rng: &mut impl Rng,
    ) -> Result<ForwardSuccess, ForwardError> {
        let mut chain: Vec<ProviderChainItem> = Vec::new();
        let mut excluded: Vec<ProviderId> = Vec::new();
        let mut attempt_number: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ForwardError::Cancelled);
            }

            let remaining: Vec<Provider> =
                catalog.iter().filter(|p| !excluded.contains(&p.id)).cloned().collect();

            let gates = HealthGates { breaker: &self.provider_breaker, fuse: &self.fuse };
            let selection_request = SelectionRequest {
                wire_format: request.wire_format,
                effective_groups: &request.effective_groups,
                requested_model: &request.requested_model,
                sticky_provider: if excluded.is_empty() { request.sticky_provider.as_ref() } else { None },
            };

            let selection: Selection =
                provider_selector::select(&remaining, &selection_request, &gates, rng).await;

            let Some(provider_id) = selection.order.first().cloned() else {
                return if chain.is_empty() {
                    Err(ForwardError::NoProviderAvailable("no eligible providers".into()))
                } else {
                    Err(ForwardError::UpstreamExhausted { chain })
                };
            };

            let Some(provider) = remaining.iter().find(|p| p.id == provider_id) else {
                return Err(ForwardError::Internal("selected provider vanished from catalog".into()));
            };

            attempt_number += 1;
            let outcome = self.attempt(request, provider, &selection.decision, attempt_number, cancel).await;

            match outcome {
                AttemptResult::Success(item, status, headers, body) => {
                    chain.push(item);
                    return Ok(ForwardSuccess { status, headers, body, chain });
                }
                AttemptResult::Retry(item) => {
                    chain.push(item);
                    excluded.push(provider.id.clone());
                    if attempt_number >= provider.max_retry_attempts {
                        return Err(ForwardError::UpstreamExhausted { chain });
                    }
                }
                AttemptResult::ClientError(item, message, status) => {
                    chain.push(item);
                    return Err(ForwardError::ClientError { attempt: attempt_number, message, status });
                }
                AttemptResult::StrictBlock(item) => {
                    chain.push(item);
                    excluded.push(provider.id.clone());
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &ForwardRequest,
        provider: &Provider,
        decision: &DecisionContext,
        attempt_number: u32,
        cancel: &CancellationToken,
    ) -> AttemptResult {
        let endpoints = self.context.endpoints_for(provider).await;
        let mut rng = rand::rng();
        let resolution: Result<Resolution, EndpointResolutionError> =
            endpoint_resolver::resolve(provider, &endpoints, &[], request.path_policy, &mut rng);

        let resolution = match resolution {
            Ok(r) => r,
            Err(e) => {
                return AttemptResult::StrictBlock(self.chain_item(
                    provider,
                    None,
                    attempt_number,
                    "strict_endpoint_blocked",
                    None,
                    0,
                    ErrorCategory::ProviderError,
                    Some(e.fuse_reason().to_string()),
                    decision,
                    Some(e.fuse_reason().to_string()),
                ));
            }
        };

        let credential = self.context.credential_for(provider).await.unwrap_or_default();
        let auth = OutboundAuth { provider_type: provider.provider_type, credential: &credential };
        let headers = build_outbound(
            &request.client_headers,
            url_host(&resolution.url),
            &auth,
            request.client_ip.as_deref(),
            provider.preserve_client_ip,
        );

        let plan = AttemptPlan {
            url: resolution.url.clone(),
            headers,
            body: request.body.clone(),
            streaming: request.streaming,
            first_byte_timeout_ms: provider.first_byte_timeout_streaming_ms,
            idle_timeout_ms: provider.streaming_idle_timeout_ms,
            total_timeout_ms: provider.request_timeout_non_streaming_ms,
        };

        let started = Instant::now();
        let dispatched = tokio::select! {
            outcome = self.dispatcher.dispatch(&plan) => outcome,
            () = cancel.cancelled() => {
                return AttemptResult::StrictBlock(self.chain_item(
                    provider, resolution.endpoint_id.clone(), attempt_number, "cancelled", None,
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX), ErrorCategory::SystemError,
                    None, decision, None,
                ));
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let classification: Classification = match &dispatched {
            DispatchOutcome::Response { status, body_preview, .. } => classify_response(*status, body_preview),
            DispatchOutcome::NetworkError => classify_network_error(),
            DispatchOutcome::Timeout => classify_timeout(),
        };

        self.update_breakers(provider, resolution.endpoint_id.as_ref(), &classification).await;

        let status = match &dispatched {
            DispatchOutcome::Response { status, .. } => Some(*status),
            _ => None,
        };
        let error_message = match &dispatched {
            DispatchOutcome::Response { body_preview, .. } if classification.category != ErrorCategory::None => {
                Some(redact_url(body_preview))
            }
            _ => None,
        };

        let item = self.chain_item(
            provider,
            resolution.endpoint_id.clone(),
            attempt_number,
            classification.reason,
            status,
            duration_ms,
            classification.category,
            error_message.clone(),
            decision,
            None,
        );

        match dispatched {
            DispatchOutcome::Response { status, full_body, headers, .. }
                if classification.category == ErrorCategory::None =>
            {
                AttemptResult::Success(item, status, headers, full_body)
            }
            _ if classification.category == ErrorCategory::ClientErrorNonRetryable => {
                AttemptResult::ClientError(item, error_message.unwrap_or_default(), status)
            }
            _ => AttemptResult::Retry(item),
        }
    }

    async fn update_breakers(
        &self,
        provider: &Provider,
        endpoint_id: Option<&EndpointId>,
        classification: &Classification,
    ) {
        let config = provider.circuit_breaker;
        match classification.category {
            ErrorCategory::None => {
                self.provider_breaker.record_success(provider.id.as_str(), &config).await;
                if let Some(endpoint_id) = endpoint_id {
                    self.endpoint_breaker.record_success(endpoint_id.as_str(), &config).await;
                }
            }
            ErrorCategory::ProviderError | ErrorCategory::SystemError => {
                self.provider_breaker.record_failure(provider.id.as_str(), &config).await;
                if let Some(endpoint_id) = endpoint_id {
                    self.endpoint_breaker.record_failure(endpoint_id.as_str(), &config).await;
                }
            }
            ErrorCategory::ClientErrorNonRetryable | ErrorCategory::ConcurrentLimitFailed => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn chain_item(
        &self,
        provider: &Provider,
        endpoint_id: Option<EndpointId>,
        attempt_number: u32,
        reason: &str,
        status_code: Option<u16>,
        duration_ms: u64,
        error_category: ErrorCategory,
        error_message: Option<String>,
        decision: &DecisionContext,
        strict_block_cause: Option<String>,
    ) -> ProviderChainItem {
        ProviderChainItem {
            provider_id: provider.id.clone(),
            provider_name: provider.name.clone(),
            vendor_id: provider.vendor_id.clone(),
            provider_type: provider.provider_type,
            endpoint_id,
            attempt_number,
            reason: reason.to_string(),
            status_code,
            duration_ms,
            error_category,
            error_message,
            circuit_state: CircuitState::Closed,
            decision_context: decision.clone(),
            strict_block_cause,
        }
    }
}

fn url_host(url: &str) -> &str {
    url.split("://").nth(1).and_then(|rest| rest.split('/').next()).unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use waypoint_core::{CircuitBreakerConfig, CostLimits, ProviderType, WireFormat};

    use super::*;

    struct ScriptedDispatcher {
        responses: Vec<DispatchOutcome>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Dispatcher for ScriptedDispatcher {
        async fn dispatch(&self, _attempt: &AttemptPlan) -> DispatchOutcome {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(idx) {
                Some(DispatchOutcome::Response { status, body_preview, full_body, headers }) => {
                    DispatchOutcome::Response {
                        status: *status,
                        body_preview: body_preview.clone(),
                        full_body: full_body.clone(),
                        headers: headers.clone(),
                    }
                }
                Some(DispatchOutcome::NetworkError) | None => DispatchOutcome::NetworkError,
                Some(DispatchOutcome::Timeout) => DispatchOutcome::Timeout,
            }
        }
    }

    struct NoEndpoints;

    #[async_trait::async_trait]
    impl ProviderContext for NoEndpoints {
        async fn endpoints_for(&self, _provider: &Provider) -> Vec<ProviderEndpoint> {
            Vec::new()
        }
        async fn credential_for(&self, _provider: &Provider) -> Option<String> {
            Some("test-credential".to_string())
        }
    }

    fn test_redis() -> waypoint_redis::RedisClient {
        waypoint_redis::RedisClient::connect("redis://127.0.0.1:6379/0").expect("valid url")
    }

    fn provider(id: &str, max_retries: u32) -> Provider {
        Provider {
            id: ProviderId::from(id.to_string()),
            name: id.to_string(),
            vendor_id: None,
            provider_type: ProviderType::Claude,
            url: "https://api.example.com/v1/messages".to_string(),
            group_tag: "default".to_string(),
            weight: 1.0,
            priority: 0,
            group_priorities: Default::default(),
            allowed_models: Vec::new(),
            model_redirects: Default::default(),
            cost_multiplier: 1.0,
            limits: CostLimits::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            max_retry_attempts: max_retries,
            proxy_url: None,
            proxy_fallback_to_direct: false,
            preserve_client_ip: false,
            first_byte_timeout_streaming_ms: 10_000,
            streaming_idle_timeout_ms: 30_000,
            request_timeout_non_streaming_ms: 60_000,
            deleted: false,
            enabled: true,
        }
    }

    fn request() -> ForwardRequest {
        ForwardRequest {
            wire_format: WireFormat::Claude,
            requested_model: "claude-3".to_string(),
            effective_groups: Vec::new(),
            sticky_provider: None,
            client_headers: reqwest::header::HeaderMap::new(),
            client_ip: None,
            body: Bytes::from_static(b"{}"),
            streaming: false,
            path: "/v1/messages".to_string(),
            path_policy: waypoint_selector::endpoint_resolver::PathPolicy::Strict,
        }
    }

    fn forwarder(
        responses: Vec<DispatchOutcome>,
    ) -> Forwarder<ScriptedDispatcher, NoEndpoints> {
        let redis = test_redis();
        Forwarder::new(
            Breaker::for_providers(redis.clone()),
            Breaker::for_endpoints(redis.clone()),
            FuseTracker::new(redis),
            ScriptedDispatcher { responses, calls: AtomicUsize::new(0) },
            NoEndpoints,
        )
    }

    #[tokio::test]
    #[ignore = "requires a local Redis instance"]
    async fn succeeds_on_first_attempt() {
        let forwarder = forwarder(vec![DispatchOutcome::Response {
            status: 200,
            body_preview: "{}".to_string(),
            full_body: Bytes::from_static(b"{\"ok\":true}"),
            headers: reqwest::header::HeaderMap::new(),
        }]);
        let catalog = vec![provider("p1", 3)];
        let cancel = CancellationToken::new();
        let mut rng = rand::rng();
        let result = forwarder.forward(&request(), &catalog, &cancel, &mut rng).await.unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.chain.len(), 1);
        assert_eq!(result.chain[0].error_category, ErrorCategory::None);
    }

    #[tokio::test]
    #[ignore = "requires a local Redis instance"]
    async fn retries_then_exhausts_across_two_providers() {
        let forwarder = forwarder(vec![
            DispatchOutcome::Response {
                status: 500,
                body_preview: "HTTP 500 Internal Server Error".to_string(),
                full_body: Bytes::new(),
                headers: reqwest::header::HeaderMap::new(),
            },
            DispatchOutcome::Response {
                status: 500,
                body_preview: "HTTP 500 Internal Server Error".to_string(),
                full_body: Bytes::new(),
                headers: reqwest::header::HeaderMap::new(),
            },
        ]);
        let catalog = vec![provider("p1", 1), provider("p2", 1)];
        let cancel = CancellationToken::new();
        let mut rng = rand::rng();
        let err = forwarder.forward(&request(), &catalog, &cancel, &mut rng).await.unwrap_err();
        match err {
            ForwardError::UpstreamExhausted { chain } => assert_eq!(chain.len(), 2),
            other => panic!("expected UpstreamExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore = "requires a local Redis instance"]
    async fn client_error_stops_retrying_immediately() {
        let forwarder = forwarder(vec![DispatchOutcome::Response {
            status: 401,
            body_preview: "authentication_error: invalid x-api-key".to_string(),
            full_body: Bytes::new(),
            headers: reqwest::header::HeaderMap::new(),
        }]);
        let catalog = vec![provider("p1", 3), provider("p2", 3)];
        let cancel = CancellationToken::new();
        let mut rng = rand::rng();
        let err = forwarder.forward(&request(), &catalog, &cancel, &mut rng).await.unwrap_err();
        assert!(matches!(err, ForwardError::ClientError { .. }));
    }

    #[tokio::test]
    #[ignore = "requires a local Redis instance"]
    async fn cancelled_before_first_attempt_returns_cancelled() {
        let forwarder = forwarder(vec![]);
        let catalog = vec![provider("p1", 3)];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rng = rand::rng();
        let err = forwarder.forward(&request(), &catalog, &cancel, &mut rng).await.unwrap_err();
        assert!(matches!(err, ForwardError::Cancelled));
    }
}
