//! Provider catalog lookups for the selector.

use waypoint_core::{Provider, ProviderId, ProviderType};

use crate::errors::StorageError;
use crate::pool::Pool;

/// Repository over the `providers` table.
pub struct ProviderRepository {
    pool: Pool,
}

impl ProviderRepository {
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// List every provider that is enabled and not soft-deleted.
    ///
    /// Most of a [`Provider`]'s tunables (timeouts, vendor preferences, model
    /// redirects, MCP passthrough) live in the `config` JSON column and are
    /// decoded wholesale rather than spread across dozens of columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool or query fails.
    pub fn list_selectable(&self) -> Result<Vec<Provider>, StorageError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, vendor_id, provider_type, url, group_tag, weight, priority, \
                    enabled, deleted, config \
             FROM providers WHERE enabled = 1 AND deleted = 0",
        )?;
        let rows = stmt.query_map([], row_to_provider)?;

        let mut providers = Vec::new();
        for row in rows {
            providers.push(row?);
        }
        Ok(providers)
    }

    /// Fetch one provider by id, regardless of enabled/deleted state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such provider exists.
    pub fn find_by_id(&self, id: &ProviderId) -> Result<Provider, StorageError> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, name, vendor_id, provider_type, url, group_tag, weight, priority, \
                    enabled, deleted, config \
             FROM providers WHERE id = ?1",
            [id.to_string()],
            row_to_provider,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StorageError::NotFound(format!("provider {id}"))
            }
            other => other.into(),
        })
    }

    /// Read the provider's stored credential (API key, bearer token, etc.)
    /// out of its `config` column.
    ///
    /// Credentials don't get a dedicated column: they live under the same
    /// JSON blob as the other tunables and are read out on demand, not
    /// decoded into [`Provider`] itself, so they never end up in a
    /// selection-decision log.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool or query fails.
    pub fn credential(&self, id: &ProviderId) -> Result<Option<String>, StorageError> {
        let conn = self.pool.get()?;
        let raw: String = conn
            .query_row(
                "SELECT config FROM providers WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StorageError::NotFound(format!("provider {id}"))
                }
                other => other.into(),
            })?;
        let config: serde_json::Value = serde_json::from_str(&raw).unwrap_or_default();
        Ok(config
            .get("credential")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }
}

fn row_to_provider(row: &rusqlite::Row<'_>) -> rusqlite::Result<Provider> {
    let config: serde_json::Value =
        serde_json::from_str(&row.get::<_, String>(10)?).unwrap_or_default();
    let get_u64 = |key: &str, default: u64| {
        config
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(default)
    };

    Ok(Provider {
        id: ProviderId::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        vendor_id: row.get::<_, Option<String>>(2)?,
        provider_type: parse_provider_type(&row.get::<_, String>(3)?),
        url: row.get(4)?,
        group_tag: row.get(5)?,
        weight: row.get(6)?,
        priority: row.get(7)?,
        group_priorities: config
            .get("groupPriorities")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        allowed_models: config
            .get("allowedModels")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        model_redirects: config
            .get("modelRedirects")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        cost_multiplier: config
            .get("costMultiplier")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(1.0),
        limits: config
            .get("limits")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        circuit_breaker: config
            .get("circuitBreaker")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        max_retry_attempts: u32::try_from(get_u64("maxRetryAttempts", 3)).unwrap_or(3),
        proxy_url: config
            .get("proxyUrl")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        proxy_fallback_to_direct: config
            .get("proxyFallbackToDirect")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        preserve_client_ip: config
            .get("preserveClientIp")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        first_byte_timeout_streaming_ms: get_u64("firstByteTimeoutStreamingMs", 10_000),
        streaming_idle_timeout_ms: get_u64("streamingIdleTimeoutMs", 30_000),
        request_timeout_non_streaming_ms: get_u64("requestTimeoutNonStreamingMs", 60_000),
        deleted: row.get(9)?,
        enabled: row.get(8)?,
    })
}

fn parse_provider_type(raw: &str) -> ProviderType {
    match raw {
        "claude-auth" => ProviderType::ClaudeAuth,
        "codex" => ProviderType::Codex,
        "openai-compatible" => ProviderType::OpenaiCompatible,
        "gemini" => ProviderType::Gemini,
        "gemini-cli" => ProviderType::GeminiCli,
        _ => ProviderType::Claude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::build_pool;

    fn seeded_pool() -> Pool {
        let pool = build_pool("file::memory:?cache=shared").unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO providers (id, name, vendor_id, provider_type, url, weight, priority, enabled, deleted, config) \
             VALUES ('p1', 'main', 'v1', 'claude', 'https://api.example.com', 1.0, 0, 1, 0, '{}'), \
                    ('p2', 'disabled', 'v1', 'claude', 'https://x', 1.0, 0, 0, 0, '{}')",
            [],
        )
        .unwrap();
        pool
    }

    #[test]
    fn lists_only_selectable_providers() {
        let repo = ProviderRepository::new(seeded_pool());
        let providers = repo.list_selectable().unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "main");
    }

    #[test]
    fn finds_disabled_provider_by_id_anyway() {
        let repo = ProviderRepository::new(seeded_pool());
        let provider = repo.find_by_id(&ProviderId::from("p2")).unwrap();
        assert!(!provider.enabled);
    }

    #[test]
    fn credential_defaults_to_none_when_absent_from_config() {
        let repo = ProviderRepository::new(seeded_pool());
        let credential = repo.credential(&ProviderId::from("p1")).unwrap();
        assert_eq!(credential, None);
    }

    #[test]
    fn credential_reads_out_of_config_json() {
        let pool = seeded_pool();
        {
            let conn = pool.get().unwrap();
            conn.execute(
                "UPDATE providers SET config = '{\"credential\":\"sk-test-123\"}' WHERE id = 'p1'",
                [],
            )
            .unwrap();
        }
        let repo = ProviderRepository::new(pool);
        let credential = repo.credential(&ProviderId::from("p1")).unwrap();
        assert_eq!(credential.as_deref(), Some("sk-test-123"));
    }
}
