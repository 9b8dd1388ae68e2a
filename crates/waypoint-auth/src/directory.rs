//! Narrow lookup port the auth guard needs from persistence.
//!
//! Defined here (rather than depended on from `waypoint-storage`) so the
//! guard pipeline doesn't pull in a concrete database driver; the storage
//! crate provides the real implementation.

use async_trait::async_trait;
use waypoint_core::{Key, User};

use crate::errors::DirectoryError;

/// Looks up the key/user pair behind a raw credential's hash.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Find the key and its owning user by the key's lookup hash.
    ///
    /// Returns `Ok(None)` if no key matches; the caller maps that to
    /// `AuthError::MalformedKey` or `MissingCredentials` as appropriate,
    /// never leaking whether a hash format is merely unrecognized vs.
    /// genuinely absent.
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<(Key, User)>, DirectoryError>;
}
