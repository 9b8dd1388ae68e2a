//! Resolves a selected provider to the concrete URL a request is sent to,
//! per the strict-endpoint policy for standard upstream paths.

use rand::Rng;
use waypoint_core::{EndpointFilterStats, EndpointId, Provider, ProviderEndpoint};

use crate::weighted::pick_weighted_index;

/// Why endpoint resolution failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointResolutionError {
    /// No endpoints are configured and enabled for this vendor+type pool.
    NoEnabledEndpoints,
    /// Endpoints exist but all have an open circuit breaker.
    AllEndpointsUnhealthy,
}

impl EndpointResolutionError {
    /// The fuse-open reason string this error maps to.
    #[must_use]
    pub fn fuse_reason(&self) -> &'static str {
        match self {
            Self::NoEnabledEndpoints => "no_enabled_endpoints",
            Self::AllEndpointsUnhealthy => "all_endpoints_unhealthy",
        }
    }
}

/// The resolved target for a request.
pub struct Resolution {
    pub url: String,
    pub endpoint_id: Option<EndpointId>,
}

/// Whether the request path may fall back to `provider.url` when the
/// endpoint pool is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathPolicy {
    /// `/v1/messages`, `/v1/responses`, `/v1/chat/completions`: no fallback.
    Strict,
    /// MCP passthrough: `provider.url` is an acceptable fallback.
    Lenient,
}

/// Resolve `provider` to a concrete URL.
///
/// `endpoints` must already be filtered to the `(vendor_id, provider_type)`
/// pool; `is_circuit_open` reports per-endpoint breaker state.
///
/// # Errors
///
/// Under [`PathPolicy::Strict`], returns [`EndpointResolutionError`] when the
/// pool has no eligible endpoint; the caller is responsible for recording
/// `strictBlockCause` and [`EndpointFilterStats`] and for opening the
/// vendor+type fuse. Under [`PathPolicy::Lenient`] the same situation instead
/// falls back to `provider.url`.
pub fn resolve(
    provider: &Provider,
    endpoints: &[ProviderEndpoint],
    open_endpoint_ids: &[EndpointId],
    policy: PathPolicy,
    rng: &mut impl Rng,
) -> Result<Resolution, EndpointResolutionError> {
    if provider.vendor_id.is_none() {
        return Ok(Resolution {
            url: provider.url.clone(),
            endpoint_id: None,
        });
    }

    let total = endpoints.len();
    let enabled: Vec<&ProviderEndpoint> = endpoints.iter().filter(|e| e.is_selectable()).collect();
    let available: Vec<&ProviderEndpoint> = enabled
        .iter()
        .copied()
        .filter(|e| !open_endpoint_ids.contains(&e.id))
        .collect();

    let stats = EndpointFilterStats {
        total,
        enabled: enabled.len(),
        circuit_open: enabled.len() - available.len(),
        available: available.len(),
    };

    if available.is_empty() {
        let error = if enabled.is_empty() {
            EndpointResolutionError::NoEnabledEndpoints
        } else {
            EndpointResolutionError::AllEndpointsUnhealthy
        };
        return match policy {
            PathPolicy::Strict => Err(error),
            PathPolicy::Lenient => {
                tracing::warn!(?stats, "endpoint pool exhausted, falling back to legacy url");
                Ok(Resolution {
                    url: provider.url.clone(),
                    endpoint_id: None,
                })
            }
        };
    }

    let lowest_sort_order = available.iter().map(|e| e.sort_order).min().unwrap_or(0);
    let bucket: Vec<&ProviderEndpoint> = available
        .into_iter()
        .filter(|e| e.sort_order == lowest_sort_order)
        .collect();

    let weights: Vec<f64> = bucket.iter().map(|e| e.weight).collect();
    let chosen = pick_weighted_index(&weights, rng).and_then(|i| bucket.get(i)).unwrap_or(&bucket[0]);

    Ok(Resolution {
        url: chosen.url.clone(),
        endpoint_id: Some(chosen.id.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::ProviderType;
    use std::collections::HashMap;

    fn provider_without_vendor() -> Provider {
        Provider {
            id: "p1".to_string().into(),
            name: "legacy".into(),
            vendor_id: None,
            provider_type: ProviderType::Claude,
            url: "https://legacy.example.com".into(),
            group_tag: "default".into(),
            weight: 1.0,
            priority: 0,
            group_priorities: HashMap::new(),
            allowed_models: vec![],
            model_redirects: HashMap::new(),
            cost_multiplier: 1.0,
            limits: waypoint_core::CostLimits::default(),
            circuit_breaker: waypoint_core::CircuitBreakerConfig::default(),
            max_retry_attempts: 3,
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

    fn endpoint(id: &str, sort_order: u8, weight: f64) -> ProviderEndpoint {
        ProviderEndpoint {
            id: id.to_string().into(),
            vendor_id: "acme".into(),
            provider_type: ProviderType::Claude,
            url: format!("https://{id}.example.com"),
            label: id.into(),
            weight,
            sort_order,
            enabled: true,
            deleted: false,
        }
    }

    #[test]
    fn legacy_provider_bypasses_endpoint_pool() {
        let mut rng = rand::rng();
        let result = resolve(&provider_without_vendor(), &[], &[], PathPolicy::Strict, &mut rng).unwrap();
        assert_eq!(result.url, "https://legacy.example.com");
        assert!(result.endpoint_id.is_none());
    }

    #[test]
    fn strict_policy_errors_on_empty_pool() {
        let mut provider = provider_without_vendor();
        provider.vendor_id = Some("acme".into());
        let mut rng = rand::rng();
        let err = resolve(&provider, &[], &[], PathPolicy::Strict, &mut rng).unwrap_err();
        assert_eq!(err, EndpointResolutionError::NoEnabledEndpoints);
    }

    #[test]
    fn lenient_policy_falls_back_to_provider_url() {
        let mut provider = provider_without_vendor();
        provider.vendor_id = Some("acme".into());
        let mut rng = rand::rng();
        let resolution = resolve(&provider, &[], &[], PathPolicy::Lenient, &mut rng).unwrap();
        assert_eq!(resolution.url, "https://legacy.example.com");
    }

    #[test]
    fn picks_from_lowest_sort_order_group_only() {
        let mut provider = provider_without_vendor();
        provider.vendor_id = Some("acme".into());
        let endpoints = vec![endpoint("e1", 0, 1.0), endpoint("e2", 1, 1.0)];
        let mut rng = rand::rng();
        let resolution = resolve(&provider, &endpoints, &[], PathPolicy::Strict, &mut rng).unwrap();
        assert_eq!(resolution.endpoint_id, Some("e1".to_string().into()));
    }

    #[test]
    fn excludes_endpoints_with_open_circuit() {
        let mut provider = provider_without_vendor();
        provider.vendor_id = Some("acme".into());
        let endpoints = vec![endpoint("e1", 0, 1.0), endpoint("e2", 0, 1.0)];
        let open = vec![EndpointId::from("e1".to_string())];
        let mut rng = rand::rng();
        let resolution = resolve(&provider, &endpoints, &open, PathPolicy::Strict, &mut rng).unwrap();
        assert_eq!(resolution.endpoint_id, Some("e2".to_string().into()));
    }

    #[test]
    fn all_unhealthy_is_distinguished_from_none_enabled() {
        let mut provider = provider_without_vendor();
        provider.vendor_id = Some("acme".into());
        let endpoints = vec![endpoint("e1", 0, 1.0)];
        let open = vec![EndpointId::from("e1".to_string())];
        let mut rng = rand::rng();
        let err = resolve(&provider, &endpoints, &open, PathPolicy::Strict, &mut rng).unwrap_err();
        assert_eq!(err, EndpointResolutionError::AllEndpointsUnhealthy);
    }
}
