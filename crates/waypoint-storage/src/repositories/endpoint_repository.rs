//! Concrete endpoint lookups for a `(vendor_id, provider_type)` pool.

use waypoint_core::{EndpointId, ProviderEndpoint, ProviderType};

use crate::errors::StorageError;
use crate::pool::Pool;

/// Repository over the `provider_endpoints` table.
pub struct EndpointRepository {
    pool: Pool,
}

impl EndpointRepository {
    /// Wrap a pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// List every enabled, non-deleted endpoint for a vendor+type pool,
    /// ordered by `sort_order`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool or query fails.
    pub fn list_for_pool(
        &self,
        vendor_id: &str,
        provider_type: ProviderType,
    ) -> Result<Vec<ProviderEndpoint>, StorageError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, vendor_id, provider_type, url, label, weight, sort_order, enabled, deleted \
             FROM provider_endpoints \
             WHERE vendor_id = ?1 AND provider_type = ?2 AND enabled = 1 AND deleted = 0 \
             ORDER BY sort_order ASC",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![vendor_id, provider_type_label(provider_type)],
            row_to_endpoint,
        )?;

        let mut endpoints = Vec::new();
        for row in rows {
            endpoints.push(row?);
        }
        Ok(endpoints)
    }

    /// Fetch one endpoint by id, regardless of enabled/deleted state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such endpoint exists.
    pub fn find_by_id(&self, id: &EndpointId) -> Result<ProviderEndpoint, StorageError> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, vendor_id, provider_type, url, label, weight, sort_order, enabled, deleted \
             FROM provider_endpoints WHERE id = ?1",
            [id.to_string()],
            row_to_endpoint,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StorageError::NotFound(format!("endpoint {id}"))
            }
            other => other.into(),
        })
    }
}

fn row_to_endpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProviderEndpoint> {
    Ok(ProviderEndpoint {
        id: EndpointId::from(row.get::<_, String>(0)?),
        vendor_id: row.get(1)?,
        provider_type: parse_provider_type(&row.get::<_, String>(2)?),
        url: row.get(3)?,
        label: row.get(4)?,
        weight: row.get(5)?,
        sort_order: row.get(6)?,
        enabled: row.get(7)?,
        deleted: row.get(8)?,
    })
}

fn provider_type_label(provider_type: ProviderType) -> &'static str {
    match provider_type {
        ProviderType::Claude => "claude",
        ProviderType::ClaudeAuth => "claude-auth",
        ProviderType::Codex => "codex",
        ProviderType::OpenaiCompatible => "openai-compatible",
        ProviderType::Gemini => "gemini",
        ProviderType::GeminiCli => "gemini-cli",
    }
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
