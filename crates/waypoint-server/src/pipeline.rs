//! The guard stages every inbound request runs before it reaches the
//! forwarder: authenticate, detect probes, resolve provider groups,
//! complete a Codex session id, assign a session, then check rate limits.
//!
//! Each stage returns `Result<_, Response>` so a route handler can just `?`
//! its way down the pipeline and return whatever rejection a stage already
//! built.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use waypoint_auth::{authenticate, AuthError, AuthState, KeyDirectory};
use waypoint_core::errors::ErrorKind;
use waypoint_core::{CostLimits, Key, RateLimitError, Session, User};
use waypoint_ratelimit::limiter::{RateLimitLease, RateLimiter, Subject};
use waypoint_session::fingerprint::{CodexCompleter, FingerprintInputs, IdSources};
use waypoint_session::tracker::{AssignContext, SessionTracker};

/// Build a JSON error body from an [`ErrorKind`] and message, at that kind's
/// mapped HTTP status.
pub fn error_response(kind: ErrorKind, message: impl Into<String>) -> Response {
    let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Json(json!({
        "error": {
            "kind": kind,
            "message": message.into(),
        }
    }));
    (status, body).into_response()
}

/// Run the auth guard and map any failure onto its HTTP response.
pub async fn authenticate_stage<D, F>(directory: &D, header: F) -> Result<AuthState, Response>
where
    D: KeyDirectory,
    F: Fn(&str) -> Option<String>,
{
    authenticate(directory, header).await.map_err(|err| {
        let message = match &err {
            AuthError::MissingCredentials => "missing credentials".to_string(),
            AuthError::MalformedKey => "invalid API key".to_string(),
            AuthError::KeyInactive { .. } => "key is disabled or expired".to_string(),
            AuthError::PermissionDenied { reason } => reason.clone(),
        };
        error_response(err.kind(), message)
    })
}

/// The provider groups this request may route to: the intersection of the
/// key's and the user's comma-joined `provider_group` lists. An empty list on
/// either side means "no restriction" for that side.
#[must_use]
pub fn effective_groups(key: &Key, user: &User) -> Vec<String> {
    let key_groups = split_groups(&key.provider_group);
    let user_groups = split_groups(&user.provider_group);

    match (key_groups.is_empty(), user_groups.is_empty()) {
        (true, true) => Vec::new(),
        (true, false) => user_groups,
        (false, true) => key_groups,
        (false, false) => key_groups
            .into_iter()
            .filter(|g| user_groups.contains(g))
            .collect(),
    }
}

fn split_groups(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `path` is the Claude `count_tokens` probe, which never counts
/// against session concurrency.
#[must_use]
pub fn is_count_tokens_probe(path: &str) -> bool {
    path.ends_with("/count_tokens")
}

/// Detects Anthropic's client warmup probe: a single-block, single-message
/// `/v1/messages` request whose only content is the literal text "warmup"
/// with an ephemeral cache_control block.
#[must_use]
pub fn is_anthropic_warmup_request(path: &str, body: &[u8]) -> bool {
    if path != "/v1/messages" {
        return false;
    }
    let Ok(root) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };
    let Some(messages) = root.get("messages").and_then(serde_json::Value::as_array) else {
        return false;
    };
    if messages.len() != 1 {
        return false;
    }
    let Some(first_message) = messages.first().and_then(serde_json::Value::as_object) else {
        return false;
    };
    if first_message.get("role").and_then(serde_json::Value::as_str) != Some("user") {
        return false;
    }
    let Some(content) = first_message.get("content").and_then(serde_json::Value::as_array) else {
        return false;
    };
    if content.len() != 1 {
        return false;
    }
    let Some(first_block) = content.first().and_then(serde_json::Value::as_object) else {
        return false;
    };
    if first_block.get("type").and_then(serde_json::Value::as_str) != Some("text") {
        return false;
    }
    let text = first_block
        .get("text")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if text != "warmup" {
        return false;
    }
    let Some(cache_control) = first_block.get("cache_control").and_then(serde_json::Value::as_object) else {
        return false;
    };
    cache_control.get("type").and_then(serde_json::Value::as_str) == Some("ephemeral")
}

/// Body for the canned warmup response, skipping the forwarder entirely.
#[must_use]
pub fn warmup_response_body(model: Option<&str>, trace_id: &str) -> serde_json::Value {
    json!({
        "model": model.unwrap_or("unknown"),
        "id": format!("msg_warmup_{trace_id}"),
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": "I'm ready to help you." }],
        "stop_reason": "end_turn",
        "stop_sequence": null,
        "usage": {
            "input_tokens": 0,
            "output_tokens": 0,
            "cache_creation_input_tokens": 0,
            "cache_read_input_tokens": 0
        }
    })
}

/// Resolve (or mint) the session id for a Codex `/v1/responses` request,
/// using headers/body candidates first and falling back to a fingerprint.
pub async fn complete_codex_session(
    completer: &CodexCompleter,
    sources: &IdSources<'_>,
    inputs: &FingerprintInputs<'_>,
) -> waypoint_session::fingerprint::Completion {
    completer.complete(sources, inputs).await
}

/// The Codex body-derived session id, read in priority order:
/// `prompt_cache_key`, `metadata.session_id`, `previous_response_id`.
#[must_use]
pub fn extract_codex_body_session_id(body: &serde_json::Value) -> Option<String> {
    body.get("prompt_cache_key")
        .and_then(serde_json::Value::as_str)
        .or_else(|| body.get("metadata").and_then(|m| m.get("session_id")).and_then(serde_json::Value::as_str))
        .or_else(|| body.get("previous_response_id").and_then(serde_json::Value::as_str))
        .map(str::to_string)
}

/// Mirror the resolved Codex session id into `prompt_cache_key` and
/// `metadata.session_id`, creating `metadata` if absent.
pub fn mirror_codex_session_id(body: &mut serde_json::Value, session_id: &str) {
    let Some(obj) = body.as_object_mut() else { return };
    obj.insert("prompt_cache_key".to_string(), json!(session_id));
    obj.entry("metadata")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .map(|m| m.insert("session_id".to_string(), json!(session_id)));
}

/// Assign or reuse a session for this request.
pub async fn assign_session_stage(
    tracker: &SessionTracker,
    key_id: &str,
    user_id: &str,
    candidate_session_id: Option<&str>,
) -> Session {
    tracker
        .assign(&AssignContext { key_id, user_id, candidate_session_id })
        .await
}

/// Run the ordered rate-limit check (RPM, concurrency, leased cost windows),
/// mapping a violation onto its HTTP response.
pub async fn rate_limit_stage(
    limiter: &RateLimiter,
    key: &Key,
    user: &User,
    session_id: &str,
    reserve_usd: f64,
) -> Result<RateLimitLease, Response> {
    let subject = Subject {
        key_id: key.id.as_str(),
        user_id: user.id.as_str(),
        session_id,
        key_limits: &key.limits,
        user_limits: &user.limits,
        daily_reset_mode: key.daily_reset_mode,
        daily_reset_time: &key.daily_reset_time,
    };
    limiter
        .check_and_reserve(&subject, reserve_usd)
        .await
        .map_err(rate_limit_error_response)
}

fn rate_limit_error_response(err: RateLimitError) -> Response {
    error_response(
        ErrorKind::RateLimitExceeded,
        format!("{} limit exceeded: {} > {}", err.limit_type, err.current, err.limit),
    )
}

/// A default reservation for the rate-limit lease, used before the request's
/// actual cost is known. Bounded by `quota_lease_fraction * effective limit`,
/// with a small floor so a free-tier (zero-limit) subject still reserves
/// something nonzero for RPM-style gating upstream.
#[must_use]
pub fn reserve_estimate(limits: &CostLimits, quota_lease_fraction: f64) -> f64 {
    let base = if limits.total_usd > 0.0 {
        limits.total_usd
    } else if limits.monthly_usd > 0.0 {
        limits.monthly_usd
    } else {
        limits.daily_usd
    };
    (base * quota_lease_fraction).max(0.01)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::{DailyResetMode, KeyId, Role, UserId};

    fn key(provider_group: &str) -> Key {
        Key {
            id: KeyId::new(),
            user_id: UserId::new(),
            secret: "sk-...".to_string(),
            enabled: true,
            expires_at: None,
            limits: CostLimits::default(),
            daily_reset_mode: DailyResetMode::Fixed,
            daily_reset_time: "00:00".to_string(),
            provider_group: provider_group.to_string(),
        }
    }

    fn user(provider_group: &str) -> User {
        User {
            id: UserId::new(),
            name: "u".to_string(),
            role: Role::User,
            limits: CostLimits::default(),
            provider_group: provider_group.to_string(),
            enabled: true,
            expires_at: None,
        }
    }

    #[test]
    fn effective_groups_intersects_when_both_set() {
        let groups = effective_groups(&key("a,b"), &user("b,c"));
        assert_eq!(groups, vec!["b".to_string()]);
    }

    #[test]
    fn effective_groups_is_unrestricted_key_falls_back_to_user() {
        let groups = effective_groups(&key(""), &user("b,c"));
        assert_eq!(groups, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn effective_groups_both_empty_means_unrestricted() {
        let groups = effective_groups(&key(""), &user(""));
        assert!(groups.is_empty());
    }

    #[test]
    fn count_tokens_path_is_a_probe() {
        assert!(is_count_tokens_probe("/v1/messages/count_tokens"));
        assert!(!is_count_tokens_probe("/v1/messages"));
    }

    #[test]
    fn detects_anthropic_warmup_shape() {
        let body = json!({
            "messages": [{
                "role": "user",
                "content": [{
                    "type": "text",
                    "text": "Warmup",
                    "cache_control": { "type": "ephemeral" }
                }]
            }]
        });
        assert!(is_anthropic_warmup_request(
            "/v1/messages",
            body.to_string().as_bytes()
        ));
    }

    #[test]
    fn rejects_non_warmup_body() {
        let body = json!({
            "messages": [{ "role": "user", "content": [{ "type": "text", "text": "hello" }] }]
        });
        assert!(!is_anthropic_warmup_request(
            "/v1/messages",
            body.to_string().as_bytes()
        ));
    }

    #[test]
    fn reserve_estimate_floors_at_minimum() {
        let limits = CostLimits::default();
        assert_eq!(reserve_estimate(&limits, 0.05), 0.01);
    }

    #[test]
    fn reserve_estimate_scales_with_total_limit() {
        let limits = CostLimits { total_usd: 100.0, ..CostLimits::default() };
        assert!((reserve_estimate(&limits, 0.05) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn extracts_prompt_cache_key_first() {
        let body = json!({ "prompt_cache_key": "abc", "previous_response_id": "xyz" });
        assert_eq!(extract_codex_body_session_id(&body).as_deref(), Some("abc"));
    }

    #[test]
    fn falls_back_to_metadata_session_id() {
        let body = json!({ "metadata": { "session_id": "meta-id" } });
        assert_eq!(extract_codex_body_session_id(&body).as_deref(), Some("meta-id"));
    }

    #[test]
    fn mirrors_session_id_into_body_fields() {
        let mut body = json!({});
        mirror_codex_session_id(&mut body, "sess-1");
        assert_eq!(body["prompt_cache_key"], "sess-1");
        assert_eq!(body["metadata"]["session_id"], "sess-1");
    }
}
