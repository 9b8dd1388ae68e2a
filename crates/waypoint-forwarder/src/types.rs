//! Request/outcome types shared across the forwarder.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use waypoint_core::{ProviderChainItem, ProviderId, WireFormat};
use waypoint_selector::endpoint_resolver::PathPolicy;

/// A single inbound request the forwarder is driving across providers.
pub struct ForwardRequest {
    pub wire_format: WireFormat,
    pub requested_model: String,
    pub effective_groups: Vec<String>,
    pub sticky_provider: Option<ProviderId>,
    pub client_headers: HeaderMap,
    pub client_ip: Option<String>,
    pub body: Bytes,
    pub streaming: bool,
    pub path: String,
    /// `Strict` for standard upstream paths, `Lenient` for MCP passthrough.
    pub path_policy: PathPolicy,
}

/// What one dispatch attempt produced, before classification.
pub enum DispatchOutcome {
    /// A response was received with this status and a preview of the body
    /// (enough to run error-text classification on failures).
    Response {
        status: u16,
        body_preview: String,
        full_body: Bytes,
        headers: HeaderMap,
    },
    /// Connect/TLS/send failure; no response was received.
    NetworkError,
    /// The per-attempt deadline elapsed.
    Timeout,
}

/// Abstracts the actual HTTP call so the retry loop can be unit-tested
/// without a network.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, attempt: &AttemptPlan) -> DispatchOutcome;
}

/// Everything needed to execute one attempt against one resolved endpoint.
pub struct AttemptPlan {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub streaming: bool,
    pub first_byte_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub total_timeout_ms: u64,
}

/// The forwarder's successful result.
pub struct ForwardSuccess {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub chain: Vec<ProviderChainItem>,
}
