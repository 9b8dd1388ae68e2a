//! Codex session-id completion: fills in a stable session id for requests
//! that don't carry one, keyed by a fingerprint of the caller and the first
//! turn's content so a retried/resumed conversation lands on the same id.

use sha2::{Digest, Sha256};
use uuid::Uuid;
use waypoint_redis::{keys, RedisClient};

/// TTL on the fingerprint-to-session-id mapping.
pub const FINGERPRINT_TTL_SECS: u64 = 5 * 60;

/// Inputs to the fingerprint hash, gathered from the request.
pub struct FingerprintInputs<'a> {
    pub key_id: &'a str,
    pub ip: &'a str,
    pub user_agent: &'a str,
    /// The system prompt and first user turn, concatenated; only their hash
    /// is folded in, not the raw text.
    pub system_and_user_text: &'a str,
}

/// `sha256(key:KID | ip:IP | ua:UA | init:sha256(system+userText))`.
#[must_use]
pub fn compute_fingerprint(inputs: &FingerprintInputs<'_>) -> String {
    let init_hash = hex_sha256(inputs.system_and_user_text.as_bytes());
    let payload = format!(
        "key:{}|ip:{}|ua:{}|init:{}",
        inputs.key_id, inputs.ip, inputs.user_agent, init_hash
    );
    hex_sha256(payload.as_bytes())
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Session ids must be 21-256 chars, alphanumeric plus `-._:`.
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    (21..=256).contains(&id.len())
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | ':'))
}

/// Where, if anywhere, the request already carried a candidate session id.
#[derive(Default)]
pub struct IdSources<'a> {
    pub header_session_id: Option<&'a str>,
    /// Already-merged body-derived id: `prompt_cache_key`,
    /// `metadata.session_id`, or `previous_response_id`, in that priority
    /// order, as resolved by the caller.
    pub body_session_id: Option<&'a str>,
}

/// The resolved session id plus where the caller must mirror it.
pub struct Completion {
    pub session_id: String,
    /// The header value did not match the resolved id and must be
    /// (re)written.
    pub mirror_to_header: bool,
    /// The body value did not match the resolved id and must be (re)written.
    pub mirror_to_body: bool,
}

/// Resolves the Codex session id for a request, using headers/body first
/// and falling back to the fingerprint cache, then a fresh UUID v7.
pub struct CodexCompleter {
    redis: RedisClient,
}

impl CodexCompleter {
    /// Wrap a Redis client.
    #[must_use]
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    /// Resolve the session id for one request.
    pub async fn complete(&self, sources: &IdSources<'_>, inputs: &FingerprintInputs<'_>) -> Completion {
        if let Some(header_id) = sources.header_session_id.filter(|id| is_valid_session_id(id)) {
            let mirror_to_body = sources.body_session_id != Some(header_id);
            self.remember(inputs, header_id).await;
            return Completion {
                session_id: header_id.to_string(),
                mirror_to_header: false,
                mirror_to_body,
            };
        }

        if let Some(body_id) = sources.body_session_id.filter(|id| is_valid_session_id(id)) {
            self.remember(inputs, body_id).await;
            return Completion {
                session_id: body_id.to_string(),
                mirror_to_header: true,
                mirror_to_body: false,
            };
        }

        let fingerprint = compute_fingerprint(inputs);
        let cache_key = keys::codex_fingerprint(&fingerprint);
        let session_id = match self.redis.get_json::<String>(&cache_key).await {
            Ok(Some(existing)) => existing,
            Ok(None) => Uuid::now_v7().to_string(),
            Err(err) => {
                tracing::warn!(%err, "codex fingerprint lookup failed, generating a fresh session id");
                Uuid::now_v7().to_string()
            }
        };
        self.remember(inputs, &session_id).await;

        Completion {
            session_id,
            mirror_to_header: true,
            mirror_to_body: true,
        }
    }

    async fn remember(&self, inputs: &FingerprintInputs<'_>, session_id: &str) {
        let fingerprint = compute_fingerprint(inputs);
        let cache_key = keys::codex_fingerprint(&fingerprint);
        let session_id = session_id.to_string();
        waypoint_redis::client::fire_and_forget("codex_fingerprint_store", || async {
            self.redis.set_json_ex(&cache_key, &session_id, FINGERPRINT_TTL_SECS).await
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> FingerprintInputs<'static> {
        FingerprintInputs {
            key_id: "k1",
            ip: "203.0.113.9",
            user_agent: "codex-cli/1.0",
            system_and_user_text: "system prompt + hello",
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(compute_fingerprint(&inputs()), compute_fingerprint(&inputs()));
    }

    #[test]
    fn fingerprint_changes_with_inputs() {
        let mut other = inputs();
        other.ip = "203.0.113.10";
        assert_ne!(compute_fingerprint(&inputs()), compute_fingerprint(&other));
    }

    #[test]
    fn validates_session_id_length_and_charset() {
        assert!(!is_valid_session_id("short"));
        assert!(is_valid_session_id(&"a".repeat(21)));
        assert!(is_valid_session_id("01990000-0000-7000-8000-000000000000"));
        assert!(!is_valid_session_id(&format!("{}!", "a".repeat(21))));
        assert!(!is_valid_session_id(&"a".repeat(257)));
    }
}
