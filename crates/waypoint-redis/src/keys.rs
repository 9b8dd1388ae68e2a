//! Key-naming for the `cch:` Redis keyspace.
//!
//! All keys share the `cch:` prefix so the engine's keyspace can be told
//! apart from other tenants sharing the same Redis instance.

/// The dimension a quota counter is scoped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaScope {
    /// Per-key counter.
    Key,
    /// Per-user counter.
    User,
}

impl QuotaScope {
    fn label(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::User => "user",
        }
    }
}

/// The rolling/fixed window a quota counter tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaWindow {
    Rpm,
    FiveHour,
    Daily,
    Weekly,
    Monthly,
    Total,
}

impl QuotaWindow {
    fn label(self) -> &'static str {
        match self {
            Self::Rpm => "rpm",
            Self::FiveHour => "5h",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Total => "total",
        }
    }
}

/// `cch:cb:provider:{id}` — circuit breaker state for a provider.
#[must_use]
pub fn circuit_breaker_provider(provider_id: &str) -> String {
    format!("cch:cb:provider:{provider_id}")
}

/// `cch:cb:endpoint:{id}` — circuit breaker state for an endpoint.
#[must_use]
pub fn circuit_breaker_endpoint(endpoint_id: &str) -> String {
    format!("cch:cb:endpoint:{endpoint_id}")
}

/// `cch:cb:vendorType:{v}:{t}` — vendor+type fuse state.
#[must_use]
pub fn circuit_breaker_vendor_type_fuse(vendor_id: &str, provider_type: &str) -> String {
    format!("cch:cb:vendorType:{vendor_id}:{provider_type}")
}

/// `cch:session:active` — set of active session ids.
#[must_use]
pub fn session_active_set() -> &'static str {
    "cch:session:active"
}

/// `cch:session:concurrent:{sid}` — per-session concurrency counter.
#[must_use]
pub fn session_concurrent(session_id: &str) -> String {
    format!("cch:session:concurrent:{session_id}")
}

/// `cch:session:key:{kid}` — active session ids for a key.
#[must_use]
pub fn session_key_set(key_id: &str) -> String {
    format!("cch:session:key:{key_id}")
}

/// `cch:session:user:{uid}` — active session ids for a user.
#[must_use]
pub fn session_user_set(user_id: &str) -> String {
    format!("cch:session:user:{user_id}")
}

/// `cch:session:record:{id}` — the serialized [`Session`](waypoint_core::Session)
/// record, TTL refreshed on activity.
#[must_use]
pub fn session_record(session_id: &str) -> String {
    format!("cch:session:record:{session_id}")
}

/// `cch:quota:{scope}:{id}:{window}` — a cost/rpm counter.
#[must_use]
pub fn quota_counter(scope: QuotaScope, id: &str, window: QuotaWindow) -> String {
    format!("cch:quota:{}:{id}:{}", scope.label(), window.label())
}

/// `cch:quota:lease:{scope}:{id}:{window}:{leaseId}` — a reserved amount
/// pending reconciliation.
#[must_use]
pub fn quota_lease(scope: QuotaScope, id: &str, window: QuotaWindow, lease_id: &str) -> String {
    format!(
        "cch:quota:lease:{}:{id}:{}:{lease_id}",
        scope.label(),
        window.label()
    )
}

/// `cch:codex:fingerprint:{fp}:session_id` — Codex session-id completion cache.
#[must_use]
pub fn codex_fingerprint(fingerprint: &str) -> String {
    format!("cch:codex:fingerprint:{fingerprint}:session_id")
}

/// `cch:prov:undo:{token}` — soft-delete undo snapshot.
#[must_use]
pub fn provider_undo(token: &str) -> String {
    format!("cch:prov:undo:{token}")
}

/// Pub/sub channel broadcasting circuit-breaker config changes.
pub const CIRCUIT_BREAKER_CONFIG_CHANNEL: &str = "cch:cache:circuit_breaker_config:updated";
/// Pub/sub channel broadcasting system settings changes.
pub const SYSTEM_SETTINGS_CHANNEL: &str = "cch:cache:system_settings:updated";
/// Pub/sub channel broadcasting provider catalog changes.
pub const PROVIDERS_CHANNEL: &str = "cch:cache:providers:updated";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_keys_are_namespaced() {
        assert_eq!(circuit_breaker_provider("p1"), "cch:cb:provider:p1");
        assert_eq!(circuit_breaker_endpoint("e1"), "cch:cb:endpoint:e1");
        assert_eq!(
            circuit_breaker_vendor_type_fuse("v1", "claude"),
            "cch:cb:vendorType:v1:claude"
        );
    }

    #[test]
    fn session_keys_are_namespaced() {
        assert_eq!(session_active_set(), "cch:session:active");
        assert_eq!(session_concurrent("s1"), "cch:session:concurrent:s1");
        assert_eq!(session_key_set("k1"), "cch:session:key:k1");
        assert_eq!(session_user_set("u1"), "cch:session:user:u1");
    }

    #[test]
    fn quota_keys_distinguish_scope_and_window() {
        let key_rpm = quota_counter(QuotaScope::Key, "k1", QuotaWindow::Rpm);
        let user_rpm = quota_counter(QuotaScope::User, "k1", QuotaWindow::Rpm);
        assert_ne!(key_rpm, user_rpm);
        assert_eq!(key_rpm, "cch:quota:key:k1:rpm");

        let lease = quota_lease(QuotaScope::Key, "k1", QuotaWindow::Daily, "lease-1");
        assert_eq!(lease, "cch:quota:lease:key:k1:daily:lease-1");
    }

    #[test]
    fn codex_and_undo_keys() {
        assert_eq!(
            codex_fingerprint("abc123"),
            "cch:codex:fingerprint:abc123:session_id"
        );
        assert_eq!(provider_undo("tok"), "cch:prov:undo:tok");
    }
}
