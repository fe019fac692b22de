//! Error type definitions
//!
//! Provides all possible error types in the Reliq queue.

/// Result type alias for Reliq
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the Reliq queue
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Redis-related errors (connection, protocol, script execution)
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::RedisError),

    /// Connection errors outside of a command round trip
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A caller passed a structurally invalid parameter
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Task has no state record
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A bounded wait elapsed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Store configuration is incompatible with the requested operation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if the error originates from the store connection layer
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Redis(_) | Error::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fred::error::{RedisError, RedisErrorKind};

    #[test]
    fn test_store_errors() {
        assert!(Error::Redis(RedisError::new(RedisErrorKind::IO, "reset")).is_store_error());
        assert!(Error::Connection("closed".to_string()).is_store_error());
        assert!(!Error::Timeout("test".to_string()).is_store_error());
        assert!(!Error::Serialization("test".to_string()).is_store_error());
    }
}
