//! Per-attempt outbound header construction and log redaction.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use waypoint_core::ProviderType;

/// Client-supplied headers copied through to upstream. Everything else is
/// dropped; auth and `Host` are set fresh per attempt below.
const FORWARDED_HEADER_WHITELIST: &[&str] = &[
    "content-type",
    "accept",
    "accept-encoding",
    "anthropic-version",
    "anthropic-beta",
    "openai-beta",
    "x-goog-api-client",
    "user-agent",
];

/// Headers whose values are replaced with `[REDACTED]` in logs.
const REDACTED_HEADER_NAMES: &[&str] =
    &["authorization", "x-api-key", "x-goog-api-key", "cookie", "set-cookie"];

/// Credential to inject for this attempt, in the form `providerType` demands.
pub struct OutboundAuth<'a> {
    pub provider_type: ProviderType,
    pub credential: &'a str,
}

/// Build the header set sent to `target_host` for one forwarder attempt.
#[must_use]
pub fn build_outbound(
    client_headers: &HeaderMap,
    target_host: &str,
    auth: &OutboundAuth<'_>,
    client_ip: Option<&str>,
    preserve_client_ip: bool,
) -> HeaderMap {
    let mut out = HeaderMap::new();

    for name in FORWARDED_HEADER_WHITELIST {
        if let Some(value) = client_headers.get(*name) {
            if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
                out.insert(header_name, value.clone());
            }
        }
    }

    if let Ok(host_value) = HeaderValue::from_str(target_host) {
        out.insert(reqwest::header::HOST, host_value);
    }

    inject_auth(&mut out, auth);

    if preserve_client_ip {
        if let Some(ip) = client_ip {
            if let Ok(value) = HeaderValue::from_str(ip) {
                out.insert(HeaderName::from_static("x-forwarded-for"), value);
            }
        }
    }

    out
}

fn inject_auth(headers: &mut HeaderMap, auth: &OutboundAuth<'_>) {
    match auth.provider_type {
        ProviderType::Claude | ProviderType::ClaudeAuth => {
            if let Ok(value) = HeaderValue::from_str(auth.credential) {
                headers.insert(HeaderName::from_static("x-api-key"), value);
            }
        }
        ProviderType::Gemini | ProviderType::GeminiCli => {
            if let Ok(value) = HeaderValue::from_str(auth.credential) {
                headers.insert(HeaderName::from_static("x-goog-api-key"), value);
            }
        }
        ProviderType::Codex | ProviderType::OpenaiCompatible => {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", auth.credential)) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }
    }
}

/// Strip the query string from a URL before it's written to a log or a
/// [`ProviderChainItem`](waypoint_core::ProviderChainItem).
#[must_use]
pub fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?[REDACTED]"),
        None => url.to_string(),
    }
}

/// Render a header map for logging, redacting deny-listed header values.
#[must_use]
pub fn redact_headers_for_log(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_ascii_lowercase();
            let value = if REDACTED_HEADER_NAMES.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[non-utf8]").to_string()
            };
            (name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_auth_uses_x_api_key() {
        let headers = build_outbound(
            &HeaderMap::new(),
            "api.anthropic.com",
            &OutboundAuth { provider_type: ProviderType::Claude, credential: "sk-test" },
            None,
            false,
        );
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-test");
        assert!(headers.get("authorization").is_none());
    }

    #[test]
    fn codex_uses_bearer_authorization() {
        let headers = build_outbound(
            &HeaderMap::new(),
            "api.openai.com",
            &OutboundAuth { provider_type: ProviderType::Codex, credential: "sk-test" },
            None,
            false,
        );
        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
    }

    #[test]
    fn client_ip_only_forwarded_when_enabled() {
        let headers = build_outbound(
            &HeaderMap::new(),
            "api.openai.com",
            &OutboundAuth { provider_type: ProviderType::Codex, credential: "k" },
            Some("203.0.113.9"),
            false,
        );
        assert!(headers.get("x-forwarded-for").is_none());

        let headers = build_outbound(
            &HeaderMap::new(),
            "api.openai.com",
            &OutboundAuth { provider_type: ProviderType::Codex, credential: "k" },
            Some("203.0.113.9"),
            true,
        );
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "203.0.113.9");
    }

    #[test]
    fn whitelist_drops_unlisted_client_headers() {
        let mut client_headers = HeaderMap::new();
        client_headers.insert("x-custom-tracing", HeaderValue::from_static("abc"));
        client_headers.insert("content-type", HeaderValue::from_static("application/json"));
        let headers = build_outbound(
            &client_headers,
            "api.openai.com",
            &OutboundAuth { provider_type: ProviderType::Codex, credential: "k" },
            None,
            false,
        );
        assert!(headers.get("x-custom-tracing").is_none());
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn redact_url_strips_query_string() {
        assert_eq!(redact_url("https://api.example.com/v1/messages?key=abc"), "https://api.example.com/v1/messages?[REDACTED]");
        assert_eq!(redact_url("https://api.example.com/v1/messages"), "https://api.example.com/v1/messages");
    }

    #[test]
    fn redact_headers_hides_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let redacted = redact_headers_for_log(&headers);
        assert_eq!(redacted.get("authorization").unwrap(), "[REDACTED]");
        assert_eq!(redacted.get("content-type").unwrap(), "application/json");
    }
}
