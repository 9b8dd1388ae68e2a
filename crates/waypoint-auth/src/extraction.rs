//! Credential extraction and format validation.
//!
//! Clients present a key as `Authorization: Bearer sk-<32 hex>`, `x-api-key:
//! sk-<32 hex>`, or `x-goog-api-key: sk-<32 hex>`, depending on which wire
//! format they're speaking. The engine never stores or compares the raw key;
//! [`hash_credential`] reduces it to a lookup hash before it touches the
//! directory.

use sha2::{Digest, Sha256};
use waypoint_core::constants::KEY_HEX_LEN;
use waypoint_core::errors::AuthError;

/// A raw credential as lifted off the wire, before format validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCredential(String);

impl RawCredential {
    /// Wrap a raw header value, trimming surrounding whitespace.
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_string())
    }

    /// The raw string as presented by the client.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Pull a credential out of a header map, checking the three header names the
/// guard pipeline recognizes, in order.
///
/// Returns `None` if none of the headers are present, which the caller maps
/// to `AuthError::MissingCredentials`.
#[must_use]
pub fn extract_credential<F>(lookup: F) -> Option<RawCredential>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("authorization") {
        let trimmed = value.trim();
        let token = trimmed.strip_prefix("Bearer ").unwrap_or(trimmed);
        return Some(RawCredential::new(token));
    }
    if let Some(value) = lookup("x-api-key") {
        return Some(RawCredential::new(&value));
    }
    if let Some(value) = lookup("x-goog-api-key") {
        return Some(RawCredential::new(&value));
    }
    None
}

/// Validate that a raw credential matches the `sk-<32 hex>` shape.
///
/// # Errors
///
/// Returns `AuthError::MalformedKey` if the prefix or hex body don't match.
pub fn validate_format(raw: &RawCredential) -> Result<(), AuthError> {
    let body = raw
        .as_str()
        .strip_prefix("sk-")
        .ok_or(AuthError::MalformedKey)?;

    if body.len() != KEY_HEX_LEN || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AuthError::MalformedKey);
    }

    Ok(())
}

/// Reduce a validated credential to the hash stored in the key directory.
///
/// The raw key is never persisted or logged; only this hash is.
#[must_use]
pub fn hash_credential(raw: &RawCredential) -> String {
    let digest = Sha256::digest(raw.as_str().as_bytes());
    hex::encode(digest)
}
