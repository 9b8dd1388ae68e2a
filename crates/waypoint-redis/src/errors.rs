//! Redis error types.

/// Errors surfaced by this crate's Redis operations.
#[derive(Debug, thiserror::Error)]
pub enum RedisError {
    /// The pool could not build or hand out a connection.
    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
    /// The pool configuration was invalid.
    #[error("redis config error: {0}")]
    Config(#[from] deadpool_redis::CreatePoolError),
    /// The underlying Redis command failed.
    #[error("redis command error: {0}")]
    Command(#[from] redis::RedisError),
    /// A stored JSON payload could not be decoded.
    #[error("redis payload decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let err: RedisError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("redis payload decode error"));
    }
}
