//! Configuration error types.

use thiserror::Error;

/// Result type for configuration resolution.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while resolving a transactional declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A rollback rule names an error class that is not registered.
    #[error("unknown error class in rollback rule: {name}")]
    UnknownErrorClass { name: String },

    /// An explicit timeout must be positive.
    #[error("invalid timeout: {timeout_ms}ms (must be greater than zero)")]
    InvalidTimeout { timeout_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigError::UnknownErrorClass {
            name: "OrderRejected".to_string(),
        };
        assert!(err.to_string().contains("OrderRejected"));

        let err = ConfigError::InvalidTimeout { timeout_ms: 0 };
        assert!(err.to_string().contains("0ms"));
    }
}
