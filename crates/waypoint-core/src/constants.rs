//! Package-level constants.

/// Current version of the proxy (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "waypoint";

/// Default session TTL in seconds, used when `SESSION_TTL` is unset.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 300;

/// Length of the random portion of a `sk-<hex>` key.
pub const KEY_HEX_LEN: usize = 32;

/// Minimum accepted length for a client-supplied or derived session id.
pub const MIN_SESSION_ID_LEN: usize = 21;

/// Maximum accepted length for a client-supplied or derived session id.
pub const MAX_SESSION_ID_LEN: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn name_is_lowercase() {
        assert_eq!(NAME, NAME.to_lowercase());
    }

    #[test]
    fn session_id_bounds_are_sane() {
        assert!(MIN_SESSION_ID_LEN < MAX_SESSION_ID_LEN);
    }
}
