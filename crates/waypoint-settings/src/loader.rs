//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WaypointSettings::default()`]
//! 2. If a settings file path is given and exists, deep-merge its JSON over
//!    the defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{BillingModelSource, WaypointSettings, WriteMode};

/// Load settings, optionally deep-merging a JSON file, then applying env
/// var overrides. `DSN` is required and returned as an error if unset.
pub fn load_settings(file_path: Option<&Path>) -> Result<WaypointSettings> {
    let defaults = serde_json::to_value(WaypointSettings::default())?;

    let merged = match file_path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        _ => defaults,
    };

    let mut settings: WaypointSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are silently ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut WaypointSettings) {
    if let Some(v) = read_env_string("DSN") {
        settings.database.dsn = v;
    }
    if let Some(v) = read_env_string("REDIS_URL") {
        settings.redis.url = v;
    }
    if let Some(v) = read_env_string("REDIS_PREFIX") {
        settings.redis.prefix = v;
    }
    if let Some(v) = read_env_bool("ENABLE_ENDPOINT_CIRCUIT_BREAKER") {
        settings.redis.enable_endpoint_circuit_breaker = v;
    }
    if let Some(v) = read_env_u64("SESSION_TTL", 1, 86_400) {
        settings.session.ttl_secs = v;
    }

    if let Some(v) = read_env_string("MESSAGE_REQUEST_WRITE_MODE") {
        match v.as_str() {
            "sync" => settings.message_request.write_mode = WriteMode::Sync,
            "async" => settings.message_request.write_mode = WriteMode::Async,
            other => tracing::warn!(value = %other, "invalid MESSAGE_REQUEST_WRITE_MODE, ignoring"),
        }
    }
    if let Some(v) = read_env_u64("MESSAGE_REQUEST_ASYNC_FLUSH_INTERVAL_MS", 10, 600_000) {
        settings.message_request.async_flush_interval_ms = v;
    }
    if let Some(v) = read_env_usize("MESSAGE_REQUEST_ASYNC_BATCH_SIZE", 1, 100_000) {
        settings.message_request.async_batch_size = v;
    }
    if let Some(v) = read_env_usize("MESSAGE_REQUEST_ASYNC_MAX_PENDING", 1, 10_000_000) {
        settings.message_request.async_max_pending = v;
    }

    if let Some(v) = read_env_string("WAYPOINT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("WAYPOINT_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_u16("WAYPOINT_METRICS_PORT", 1, 65535) {
        settings.server.metrics_port = v;
    }
    if let Some(v) = read_env_string("WAYPOINT_LOG_FORMAT") {
        if let Ok(fmt) = serde_json::from_value(Value::String(v)) {
            settings.server.log_format = fmt;
        }
    }
    if let Some(v) = read_env_string("WAYPOINT_LOG_LEVEL") {
        settings.server.log_level = v;
    }

    if let Some(v) = read_env_string("WAYPOINT_BILLING_MODEL_SOURCE") {
        settings.system.billing_model_source = match v.as_str() {
            "redirected" => BillingModelSource::Redirected,
            _ => BillingModelSource::Original,
        };
    }
    if let Some(v) = read_env_bool("WAYPOINT_VERBOSE_PROVIDER_ERROR") {
        settings.system.verbose_provider_error = v;
    }
    if let Some(v) = read_env_bool("WAYPOINT_ENABLE_CODEX_SESSION_ID_COMPLETION") {
        settings.system.enable_codex_session_id_completion = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
