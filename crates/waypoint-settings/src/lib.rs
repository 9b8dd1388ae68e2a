//! # waypoint-settings
//!
//! Layered configuration for the request execution engine:
//!
//! 1. **Compiled defaults** — [`WaypointSettings::default()`]
//! 2. **Optional JSON file** — deep-merged over defaults
//! 3. **Environment variables** — highest priority
//!
//! Most of the surface is boot-time environment variables (`DSN`,
//! `REDIS_URL`, `SESSION_TTL`, ...). The [`types::SystemSettings`] subset is
//! additionally expected to be refreshed from the database on a timer by the
//! caller; this crate only defines its shape and default values.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings};
pub use types::*;

/// Require that `DSN` was set, turning an empty default into an error.
///
/// # Errors
///
/// Returns [`SettingsError::MissingRequired`] if `settings.database.dsn` is
/// empty.
pub fn require_dsn(settings: &WaypointSettings) -> Result<&str> {
    if settings.database.dsn.is_empty() {
        Err(SettingsError::MissingRequired("DSN".to_owned()))
    } else {
        Ok(&settings.database.dsn)
    }
}
