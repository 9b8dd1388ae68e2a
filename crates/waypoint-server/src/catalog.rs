//! [`ProviderContext`] over the `SQLite`-backed provider and endpoint
//! repositories.

use waypoint_core::{Provider, ProviderEndpoint};
use waypoint_forwarder::ProviderContext;
use waypoint_storage::{EndpointRepository, ProviderRepository};

/// Resolves a provider's endpoint pool and credential straight out of the
/// database, with no caching: the forwarder calls this once per attempt, and
/// the repositories already sit behind a connection pool.
pub struct RepositoryProviderContext {
    providers: ProviderRepository,
    endpoints: EndpointRepository,
}

impl RepositoryProviderContext {
    #[must_use]
    pub fn new(providers: ProviderRepository, endpoints: EndpointRepository) -> Self {
        Self { providers, endpoints }
    }
}

#[async_trait::async_trait]
impl ProviderContext for RepositoryProviderContext {
    async fn endpoints_for(&self, provider: &Provider) -> Vec<ProviderEndpoint> {
        let Some(vendor_id) = provider.vendor_id.as_deref() else {
            return Vec::new();
        };
        self.endpoints
            .list_for_pool(vendor_id, provider.provider_type)
            .unwrap_or_else(|err| {
                tracing::warn!(provider_id = %provider.id, %err, "failed to list endpoint pool");
                Vec::new()
            })
    }

    async fn credential_for(&self, provider: &Provider) -> Option<String> {
        self.providers
            .credential(&provider.id)
            .unwrap_or_else(|err| {
                tracing::warn!(provider_id = %provider.id, %err, "failed to read provider credential");
                None
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::{ProviderId, ProviderType};
    use waypoint_storage::build_pool;

    fn provider(id: &str, vendor_id: Option<&str>) -> Provider {
        Provider {
            id: ProviderId::from(id),
            name: id.to_string(),
            vendor_id: vendor_id.map(str::to_string),
            provider_type: ProviderType::Claude,
            url: "https://api.example.com".to_string(),
            group_tag: String::new(),
            weight: 1.0,
            priority: 0,
            group_priorities: Default::default(),
            allowed_models: Default::default(),
            model_redirects: Default::default(),
            cost_multiplier: 1.0,
            limits: Default::default(),
            circuit_breaker: Default::default(),
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

    #[tokio::test]
    async fn provider_with_no_vendor_id_has_no_endpoints() {
        let pool = build_pool("file::memory:?cache=shared").unwrap();
        let ctx = RepositoryProviderContext::new(
            ProviderRepository::new(pool.clone()),
            EndpointRepository::new(pool),
        );
        let endpoints = ctx.endpoints_for(&provider("p1", None)).await;
        assert!(endpoints.is_empty());
    }

    #[tokio::test]
    async fn missing_provider_credential_is_none() {
        let pool = build_pool("file::memory:?cache=shared").unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO providers (id, name, vendor_id, provider_type, url, weight, priority, enabled, deleted, config) \
             VALUES ('p1', 'main', 'v1', 'claude', 'https://api.example.com', 1.0, 0, 1, 0, '{}')",
            [],
        )
        .unwrap();
        drop(conn);
        let ctx = RepositoryProviderContext::new(
            ProviderRepository::new(pool.clone()),
            EndpointRepository::new(pool),
        );
        let credential = ctx.credential_for(&provider("p1", Some("v1"))).await;
        assert_eq!(credential, None);
    }
}
