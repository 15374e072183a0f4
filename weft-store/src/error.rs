//! Error types for the weft-store crate.

use std::io;

use thiserror::Error;

use crate::store::Handle;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Handle is unknown to this store or was already settled.
    #[error("Unknown handle: {0}")]
    UnknownHandle(Handle),

    /// Broker-level failure (connection, channel, publish, ack).
    #[error("Broker error: {0}")]
    Broker(String),

    /// Store configuration or backing-medium validation failed.
    #[error("Store validation error: {0}")]
    Validation(String),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// Convenience conversion for lock poisoning
impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

impl From<lapin::Error> for StoreError {
    fn from(e: lapin::Error) -> Self {
        Self::Broker(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::UnknownHandle(Handle::new("42"));
        assert_eq!(err.to_string(), "Unknown handle: 42");

        let err = StoreError::Validation("not a directory".to_string());
        assert_eq!(err.to_string(), "Store validation error: not a directory");

        let err = StoreError::Internal("test error".to_string());
        assert_eq!(err.to_string(), "Internal error: test error");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::Io(_)));
        assert!(store_err.to_string().contains("file not found"));
    }
}
