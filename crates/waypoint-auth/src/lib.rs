//! # waypoint-auth
//!
//! Client key authentication: the first guard in the request pipeline.
//!
//! Extracts a credential from the `Authorization`/`x-api-key`/`x-goog-api-key`
//! headers, validates its shape, hashes it, and resolves it to a
//! `{key, user}` pair through a narrow [`directory::KeyDirectory`] port. The
//! concrete lookup (backed by `waypoint-storage`) is injected by the caller,
//! so this crate never depends on a database driver.

#![deny(unsafe_code)]

pub mod directory;
pub mod errors;
pub mod extraction;

pub use directory::KeyDirectory;
pub use errors::{AuthError, DirectoryError};

use chrono::Utc;
use waypoint_core::{Key, User};

/// The resolved identity of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthState {
    /// The key that authenticated the request.
    pub key: Key,
    /// The key's owning user.
    pub user: User,
}

/// Run the full auth guard: extract, validate, hash, look up, check active.
///
/// `header` is a lookup closure over the inbound request's headers (kept
/// generic so this crate doesn't depend on a particular HTTP framework's
/// header map type).
///
/// # Errors
///
/// - [`AuthError::MissingCredentials`] if none of the three headers are set.
/// - [`AuthError::MalformedKey`] if the credential doesn't match `sk-<32
///   hex>`, or if the directory has no matching key.
/// - [`AuthError::KeyInactive`] if the key is disabled, expired, or its user
///   is disabled.
pub async fn authenticate<D, F>(directory: &D, header: F) -> Result<AuthState, AuthError>
where
    D: KeyDirectory,
    F: Fn(&str) -> Option<String>,
{
    let raw = extraction::extract_credential(header).ok_or(AuthError::MissingCredentials)?;
    extraction::validate_format(&raw)?;
    let hash = extraction::hash_credential(&raw);

    let (key, user) = directory
        .find_by_hash(&hash)
        .await
        .map_err(|_| AuthError::MalformedKey)?
        .ok_or(AuthError::MalformedKey)?;

    let now = Utc::now();
    if !key.is_active(now) {
        return Err(AuthError::KeyInactive {
            key_id: key.id.to_string(),
        });
    }
    if !user.enabled {
        return Err(AuthError::KeyInactive {
            key_id: key.id.to_string(),
        });
    }

    Ok(AuthState { key, user })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::test_support::InMemoryDirectory;
    use waypoint_core::constants::KEY_HEX_LEN;
    use waypoint_core::{CostLimits, DailyResetMode, KeyId, Role, UserId};

    fn sample_key(enabled: bool) -> Key {
        Key {
            id: KeyId::new(),
            user_id: UserId::new(),
            secret: "sk-...redacted".to_string(),
            enabled,
            expires_at: None,
            limits: CostLimits::default(),
            daily_reset_mode: DailyResetMode::Fixed,
            daily_reset_time: "00:00".to_string(),
            provider_group: String::new(),
        }
    }

    fn sample_user(enabled: bool) -> User {
        User {
            id: UserId::new(),
            name: "test user".to_string(),
            role: Role::User,
            limits: CostLimits::default(),
            provider_group: String::new(),
            enabled,
            expires_at: None,
        }
    }

    fn valid_key_str() -> String {
        format!("sk-{}", "c".repeat(KEY_HEX_LEN))
    }

    #[tokio::test]
    async fn rejects_missing_credentials() {
        let dir = InMemoryDirectory::default();
        let err = authenticate(&dir, |_| None).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
    }

    #[tokio::test]
    async fn rejects_malformed_key() {
        let dir = InMemoryDirectory::default();
        let err = authenticate(&dir, |name| {
            (name == "x-api-key").then(|| "not-a-key".to_string())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::MalformedKey));
    }

    #[tokio::test]
    async fn rejects_unknown_key() {
        let dir = InMemoryDirectory::default();
        let raw = valid_key_str();
        let err = authenticate(&dir, move |name| {
            (name == "x-api-key").then(|| raw.clone())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::MalformedKey));
    }

    #[tokio::test]
    async fn accepts_known_active_key() {
        let raw = valid_key_str();
        let hash = extraction::hash_credential(&extraction::RawCredential::new(&raw));
        let mut dir = InMemoryDirectory::default();
        let _ = dir
            .entries
            .insert(hash, (sample_key(true), sample_user(true)));

        let state = authenticate(&dir, move |name| {
            (name == "x-api-key").then(|| raw.clone())
        })
        .await
        .unwrap();
        assert!(state.key.enabled);
    }

    #[tokio::test]
    async fn rejects_disabled_key() {
        let raw = valid_key_str();
        let hash = extraction::hash_credential(&extraction::RawCredential::new(&raw));
        let mut dir = InMemoryDirectory::default();
        let _ = dir
            .entries
            .insert(hash, (sample_key(false), sample_user(true)));

        let err = authenticate(&dir, move |name| {
            (name == "x-api-key").then(|| raw.clone())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::KeyInactive { .. }));
    }

    #[tokio::test]
    async fn rejects_disabled_user() {
        let raw = valid_key_str();
        let hash = extraction::hash_credential(&extraction::RawCredential::new(&raw));
        let mut dir = InMemoryDirectory::default();
        let _ = dir
            .entries
            .insert(hash, (sample_key(true), sample_user(false)));

        let err = authenticate(&dir, move |name| {
            (name == "x-api-key").then(|| raw.clone())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::KeyInactive { .. }));
    }
}
