//! Typed settings structures.
//!
//! Mirrors the environment variable surface and DB-sourced system settings
//! table the request execution engine reads at boot and on a refresh timer.

use serde::{Deserialize, Serialize};

/// Top-level settings for one proxy instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaypointSettings {
    /// Package version, informational only.
    pub version: String,
    /// HTTP server configuration.
    pub server: ServerSettings,
    /// Database connection settings.
    pub database: DatabaseSettings,
    /// Redis connection settings.
    pub redis: RedisSettings,
    /// Session tracking configuration.
    pub session: SessionSettings,
    /// Message-request bookkeeping write path.
    pub message_request: MessageRequestSettings,
    /// DB-sourced system-wide toggles.
    pub system: SystemSettings,
}

impl Default for WaypointSettings {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            redis: RedisSettings::default(),
            session: SessionSettings::default(),
            message_request: MessageRequestSettings::default(),
            system: SystemSettings::default(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port for the proxy's HTTP surface.
    pub port: u16,
    /// Port the Prometheus exporter listens on.
    pub metrics_port: u16,
    /// Log format: `pretty` or `json`.
    pub log_format: LogFormat,
    /// `tracing_subscriber::EnvFilter`-style filter string.
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            metrics_port: 9090,
            log_format: LogFormat::Pretty,
            log_level: "info".to_owned(),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized when attached to a TTY.
    Pretty,
    /// Newline-delimited JSON, for log aggregation.
    Json,
}

/// Database connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Connection string. Required at startup; empty here means unset.
    pub dsn: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { dsn: String::new() }
    }
}

/// Redis connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisSettings {
    /// Connection URL.
    pub url: String,
    /// Key prefix applied to every Redis key this engine writes.
    pub prefix: String,
    /// Whether the per-endpoint circuit breaker is enabled (in addition to
    /// the always-on per-provider breaker).
    pub enable_endpoint_circuit_breaker: bool,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_owned(),
            prefix: "cch".to_owned(),
            enable_endpoint_circuit_breaker: true,
        }
    }
}

/// Session tracking configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// TTL, in seconds, since last activity before a session is considered
    /// expired.
    pub ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

/// Whether message-request bookkeeping rows are written synchronously
/// (on the request path) or buffered and flushed asynchronously.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Write and await before responding.
    Sync,
    /// Enqueue into the bounded write buffer.
    Async,
}

/// Message-request write path tuning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRequestSettings {
    /// Sync vs async write mode.
    pub write_mode: WriteMode,
    /// Flush interval for the async writer, in ms.
    pub async_flush_interval_ms: u64,
    /// Max rows flushed per batch.
    pub async_batch_size: usize,
    /// Max rows the bounded channel holds before dropping the oldest.
    pub async_max_pending: usize,
}

impl Default for MessageRequestSettings {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::Async,
            async_flush_interval_ms: 1000,
            async_batch_size: 100,
            async_max_pending: 10_000,
        }
    }
}

/// Where the model name used for billing comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingModelSource {
    /// Bill against the model the client asked for.
    Original,
    /// Bill against the model the provider actually routed to
    /// (`model_redirects`).
    Redirected,
}

/// DB-sourced system-wide toggles, refreshed on a timer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemSettings {
    /// Which model name cost is computed against.
    pub billing_model_source: BillingModelSource,
    /// Whether non-admin users can see cross-user usage aggregates.
    pub allow_global_usage_view: bool,
    /// Whether stale sessions/leases are periodically swept.
    pub enable_auto_cleanup: bool,
    /// Whether raw upstream error text is ever returned to clients
    /// (admin sessions only).
    pub verbose_provider_error: bool,
    /// Whether outbound connections may use HTTP/2.
    pub enable_http2: bool,
    /// Whether Anthropic's client warmup probe requests are intercepted
    /// before reaching a provider.
    pub intercept_anthropic_warmup_requests: bool,
    /// Whether Codex session-id fingerprint completion runs.
    pub enable_codex_session_id_completion: bool,
    /// Fraction of a cost limit reserved as a lease before the actual cost
    /// is known, in `[0, 1]`.
    pub quota_lease_fraction: f64,
    /// Interval, in seconds, between DB refreshes of rate-limit counters.
    pub quota_db_refresh_interval_secs: u64,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            billing_model_source: BillingModelSource::Original,
            allow_global_usage_view: false,
            enable_auto_cleanup: true,
            verbose_provider_error: false,
            enable_http2: true,
            intercept_anthropic_warmup_requests: true,
            enable_codex_session_id_completion: true,
            quota_lease_fraction: 0.05,
            quota_db_refresh_interval_secs: 60,
        }
    }
}
