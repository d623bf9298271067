//! Error types for the postroom-store crate.
//!
//! This module provides typed error handling for store operations including
//! file I/O, serialization, and validation.

use std::io;

use postroom_common::message::MessageId;
use thiserror::Error;

/// Top-level store error type.
///
/// All store operations return this error type, which categorizes failures
/// into I/O, serialization, validation, and logical errors. Claim contention
/// is deliberately NOT an error: `MessageStore::claim` reports it as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (record read/write/rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Message not found in the store.
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    /// Message already exists in the store.
    #[error("Message already exists: {0}")]
    AlreadyExists(MessageId),

    /// Store path validation failed.
    #[error("Store validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Store directory validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Store path is not a directory.
    #[error("Store path is not a directory: {0}")]
    NotDirectory(String),

    /// Invalid store path (relative, traversal, or system directory).
    #[error("Invalid store path: {0}")]
    InvalidPath(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "record not found");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::Io(_)));
        assert!(store_err.to_string().contains("record not found"));
    }

    #[test]
    fn validation_error_display() {
        let err = StoreError::from(ValidationError::InvalidPath("relative/path".to_string()));
        assert_eq!(
            err.to_string(),
            "Store validation error: Invalid store path: relative/path"
        );
    }
}
