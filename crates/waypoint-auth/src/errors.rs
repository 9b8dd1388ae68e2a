//! Auth-layer error types.

pub use waypoint_core::errors::AuthError;

/// Failure reaching or reading the key directory itself, as distinct from
/// the credential being rejected.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The backing store could not be reached or returned a storage-layer
    /// error.
    #[error("key directory unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_error_display() {
        let err = DirectoryError::Unavailable("connection reset".to_string());
        assert!(err.to_string().contains("connection reset"));
    }
}
