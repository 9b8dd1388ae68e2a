//! Shared domain vocabulary for the request execution engine.
//!
//! These types describe the entities the pipeline reasons about:
//! [`Provider`] and [`ProviderEndpoint`] (routing targets), [`Key`] and
//! [`User`] (auth subjects), [`Session`] (conversation correlation),
//! [`CircuitBreakerState`] (per-target health), and [`ProviderChainItem`]
//! (the audit trail of one request's attempts). They are intentionally
//! storage-agnostic: repositories in `waypoint-storage` read and write them,
//! but nothing here depends on a particular backend.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EndpointId, KeyId, ProviderId, SessionId, UserId};

/// The wire protocol a provider speaks, and which incoming path family it
/// can serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    /// Anthropic Claude Messages API with a direct API key.
    Claude,
    /// Anthropic Claude Messages API authenticated via OAuth passthrough.
    ClaudeAuth,
    /// OpenAI Codex `/v1/responses` family.
    Codex,
    /// Any OpenAI-compatible `/v1/chat/completions` backend.
    OpenaiCompatible,
    /// Google Gemini `generateContent` family.
    Gemini,
    /// Gemini via the `gemini-cli` internal surface.
    GeminiCli,
}

impl ProviderType {
    /// Provider types able to serve a given wire format.
    #[must_use]
    pub fn compatible_with(self, format: WireFormat) -> bool {
        matches!(
            (format, self),
            (WireFormat::Claude, Self::Claude | Self::ClaudeAuth)
                | (WireFormat::Openai, Self::OpenaiCompatible)
                | (WireFormat::Codex, Self::Codex)
                | (WireFormat::Gemini, Self::Gemini | Self::GeminiCli)
        )
    }
}

/// The wire format of an incoming request, derived from its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// `/v1/messages`, `/v1/messages/count_tokens`.
    Claude,
    /// `/v1/chat/completions`.
    Openai,
    /// `/v1/responses`, `/v1/responses/compact`.
    Codex,
    /// `/v1beta/models/*`, `/v1/publishers/google/*`, `/v1internal/*`.
    Gemini,
}

/// A configured upstream provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Provider {
    /// Stable identifier.
    pub id: ProviderId,
    /// Operator-facing name.
    pub name: String,
    /// Vendor grouping used to resolve concrete endpoints; `None` means
    /// `url` is used directly (legacy single-endpoint provider).
    pub vendor_id: Option<String>,
    /// Protocol this provider speaks.
    pub provider_type: ProviderType,
    /// Legacy single-endpoint URL, used when `vendor_id` is `None` or for
    /// MCP passthrough.
    pub url: String,
    /// Access-control group tag.
    pub group_tag: String,
    /// Selection weight within its priority bucket. Must be `>= 0`.
    pub weight: f64,
    /// Priority bucket; lower values are tried first.
    pub priority: u8,
    /// Per-group priority override.
    pub group_priorities: HashMap<String, u8>,
    /// Models this provider is allowed to serve; empty means no restriction.
    pub allowed_models: Vec<String>,
    /// Rewrites a requested model name before it's sent upstream.
    pub model_redirects: HashMap<String, String>,
    /// Cost multiplier applied on top of the base price table.
    pub cost_multiplier: f64,
    /// Limits enforced by the rate limiter for this provider's own budget.
    pub limits: CostLimits,
    /// Circuit breaker tuning.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Maximum forwarder retry attempts before giving up on this provider.
    pub max_retry_attempts: u32,
    /// Outbound proxy URL, if routed through one.
    pub proxy_url: Option<String>,
    /// Whether to retry directly if the proxy connection fails.
    pub proxy_fallback_to_direct: bool,
    /// Forward the client's real IP to this provider (`X-Forwarded-For`).
    pub preserve_client_ip: bool,
    /// Time-to-first-byte timeout for streaming responses, in ms.
    pub first_byte_timeout_streaming_ms: u64,
    /// Idle-gap timeout for streaming responses, in ms.
    pub streaming_idle_timeout_ms: u64,
    /// Total timeout for non-streaming responses, in ms.
    pub request_timeout_non_streaming_ms: u64,
    /// Whether the provider has been soft-deleted (invisible to selection).
    pub deleted: bool,
    /// Whether the provider is administratively enabled.
    pub enabled: bool,
}

impl Provider {
    /// Effective priority for the given provider group, honoring
    /// `group_priorities` overrides.
    #[must_use]
    pub fn priority_for_group(&self, group: &str) -> u8 {
        self.group_priorities.get(group).copied().unwrap_or(self.priority)
    }

    /// Whether the circuit breaker is administratively disabled for this
    /// provider (per the invariant that `failure_threshold <= 0` forces the
    /// circuit permanently closed).
    #[must_use]
    pub fn circuit_breaker_disabled(&self) -> bool {
        self.circuit_breaker.failure_threshold == 0
    }

    /// Whether this provider is visible to the selector at all.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        self.enabled && !self.deleted
    }
}

/// A concrete endpoint URL within a `(vendor_id, provider_type)` pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// Stable identifier.
    pub id: EndpointId,
    /// Vendor this endpoint belongs to.
    pub vendor_id: String,
    /// Protocol family this endpoint serves.
    pub provider_type: ProviderType,
    /// The concrete URL.
    pub url: String,
    /// Operator label.
    pub label: String,
    /// Selection weight within its sort-order group.
    pub weight: f64,
    /// Ordering group; lowest is tried first.
    pub sort_order: u8,
    /// Whether the endpoint is administratively enabled.
    pub enabled: bool,
    /// Whether the endpoint has been soft-deleted.
    pub deleted: bool,
}

impl ProviderEndpoint {
    /// Whether this endpoint is visible to the resolver.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        self.enabled && !self.deleted
    }
}

/// How a key's daily cost window resets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyResetMode {
    /// Resets at a fixed wall-clock time every day.
    Fixed,
    /// A rolling 24-hour window, no fixed reset instant.
    Rolling,
}

/// Cost and concurrency limits shared by [`Key`], [`User`], and [`Provider`].
/// `0` in any field is treated as "inherit from the enclosing subject"
/// (see the rate limiter's key→user concurrency inheritance rule).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CostLimits {
    /// Requests-per-minute cap.
    pub rpm: u32,
    /// Max concurrent in-flight sessions.
    pub concurrent_sessions: u32,
    /// Rolling 5-hour USD cap.
    pub five_hour_usd: f64,
    /// Daily USD cap.
    pub daily_usd: f64,
    /// Weekly USD cap.
    pub weekly_usd: f64,
    /// Monthly USD cap.
    pub monthly_usd: f64,
    /// Lifetime total USD cap (admin-reset only).
    pub total_usd: f64,
}

/// Circuit breaker tuning parameters for one provider (or endpoint).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens. `<= 0` disables the
    /// breaker entirely (always closed).
    pub failure_threshold: i32,
    /// How long the circuit stays open before probing again, in ms.
    pub open_duration_ms: u64,
    /// Consecutive successes in half-open needed to close again.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_ms: 30_000,
            half_open_success_threshold: 2,
        }
    }
}

/// An authentication key presented by a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Key {
    /// Stable identifier.
    pub id: KeyId,
    /// Owning user.
    pub user_id: UserId,
    /// The raw secret, `sk-<32 hex>`. Never logged.
    pub secret: String,
    /// Whether this key currently accepts requests.
    pub enabled: bool,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Per-key limits; any `0` field inherits the owning user's limit.
    pub limits: CostLimits,
    /// Daily reset behavior.
    pub daily_reset_mode: DailyResetMode,
    /// Wall-clock time of day the fixed daily window resets, `HH:MM`.
    pub daily_reset_time: String,
    /// Comma-joined provider groups this key may route to.
    pub provider_group: String,
}

impl Key {
    /// Whether the key is currently usable (enabled and not expired).
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.expires_at.is_none_or(|exp| exp > now)
    }
}

/// A role granting elevated access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full administrative access.
    Admin,
    /// Standard proxy consumer.
    User,
}

/// The owner of one or more [`Key`]s.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Access role.
    pub role: Role,
    /// Limits applied when a key's own limit is `0` (inherit).
    pub limits: CostLimits,
    /// Union of provider groups across this user's active keys.
    pub provider_group: String,
    /// Whether the account currently accepts requests.
    pub enabled: bool,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// A conversation correlation id, with provider stickiness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// The session id (UUID v7, or client-supplied/derived).
    pub id: SessionId,
    /// The key that first created this session.
    pub key_id: KeyId,
    /// The owning user.
    pub user_id: UserId,
    /// The provider chosen on the first request, preferred on reuse.
    pub sticky_provider: Option<ProviderId>,
    /// Monotonic per-session request counter.
    pub request_sequence: u64,
    /// Last activity timestamp, used to compute TTL expiry.
    pub last_seen: DateTime<Utc>,
}

/// Circuit breaker state for one target (provider, endpoint, or
/// vendor+type fuse).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Serving requests normally.
    Closed,
    /// Short-circuiting all requests until `open_until`.
    Open,
    /// Probing with a limited number of requests before deciding.
    HalfOpen,
}

/// Persisted state of one circuit breaker.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Consecutive failures observed in `Closed`.
    pub failure_count: u32,
    /// Timestamp of the most recent failure.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Current state.
    pub state: CircuitState,
    /// When `Open` transitions to `HalfOpen`.
    pub open_until: Option<DateTime<Utc>>,
    /// Consecutive successes observed in `HalfOpen`.
    pub half_open_success_count: u32,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            failure_count: 0,
            last_failure_time: None,
            state: CircuitState::Closed,
            open_until: None,
            half_open_success_count: 0,
        }
    }
}

/// Why a forwarder attempt ended the way it did, and how the failure
/// classifies for retry purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The attempt succeeded.
    None,
    /// Network/TLS/DNS/timeout failure; retry by switching target.
    SystemError,
    /// Upstream returned an error status; retryable by switching provider.
    ProviderError,
    /// Client-caused 4xx that will fail identically on retry.
    ClientErrorNonRetryable,
    /// A concurrency limit rejected the attempt before dispatch.
    ConcurrentLimitFailed,
}

/// One entry in a request's provider attempt audit trail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderChainItem {
    /// Provider attempted.
    pub provider_id: ProviderId,
    /// Provider name, for readability in logs/UI.
    pub provider_name: String,
    /// Vendor id, if resolved through the endpoint pool.
    pub vendor_id: Option<String>,
    /// Protocol family.
    pub provider_type: ProviderType,
    /// Endpoint attempted, if resolved through the endpoint pool.
    pub endpoint_id: Option<EndpointId>,
    /// 1-based attempt number within this request; gapless.
    pub attempt_number: u32,
    /// Why this attempt happened / ended (`initial_selection`,
    /// `retry_success`, `system_error`, etc).
    pub reason: String,
    /// HTTP status returned, if any.
    pub status_code: Option<u16>,
    /// Wall-clock duration of the attempt, in ms.
    pub duration_ms: u64,
    /// Outcome classification.
    pub error_category: ErrorCategory,
    /// Upstream error text, redacted of secrets.
    pub error_message: Option<String>,
    /// Circuit breaker state observed at selection time.
    pub circuit_state: CircuitState,
    /// Snapshot of the selection decision that picked this candidate.
    pub decision_context: DecisionContext,
    /// Set only when strict endpoint policy refused a fallback.
    pub strict_block_cause: Option<String>,
}

/// One candidate considered during provider selection, with its weighted
/// pick probability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    /// Candidate provider id.
    pub id: ProviderId,
    /// Candidate provider name.
    pub name: String,
    /// Selection weight used.
    pub weight: f64,
    /// Cost multiplier, surfaced for audit.
    pub cost_multiplier: f64,
    /// Probability this candidate was picked, in `[0, 1]`.
    pub probability: f64,
}

/// Why a candidate was filtered out of selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilteredProvider {
    /// Filtered provider id.
    pub id: ProviderId,
    /// Filtered provider name.
    pub name: String,
    /// Coarse reason: `circuit_open`, `rate_limited`, `disabled`,
    /// `group_mismatch`, `model_not_allowed`.
    pub reason: String,
    /// Extra detail for logs.
    pub details: Option<String>,
}

/// Full audit snapshot of one provider-selection decision.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DecisionContext {
    /// Total providers considered before filtering.
    pub total_providers: usize,
    /// Providers remaining after the enabled/group/model filters.
    pub enabled: usize,
    /// Providers remaining after circuit/rate-limit health filters.
    pub after_health_check: usize,
    /// The priority bucket selection was made from.
    pub selected_priority: Option<u8>,
    /// Candidates in the selected bucket, with their pick probabilities.
    pub candidates_at_priority: Vec<CandidateSnapshot>,
    /// Providers filtered out, with reasons.
    pub filtered_providers: Vec<FilteredProvider>,
}

/// Endpoint-pool filter statistics, recorded when strict endpoint policy
/// blocks a fallback.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EndpointFilterStats {
    /// Total endpoints configured for the vendor+type pool.
    pub total: usize,
    /// Endpoints administratively enabled.
    pub enabled: usize,
    /// Endpoints whose circuit breaker is open.
    pub circuit_open: usize,
    /// Endpoints actually available for selection.
    pub available: usize,
}
