//! Error types for TileData
//!
//! This module defines the common error types used throughout the system.

use crate::types::NamespacedKeyError;
use thiserror::Error;

/// Common result type for TileData operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for TileData
#[derive(Debug, Error)]
pub enum Error {
    // Identifier errors
    #[error("invalid record id: {0}")]
    InvalidRecordId(String),

    #[error("invalid namespaced key: {0}")]
    InvalidNamespacedKey(#[from] NamespacedKeyError),

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    // Request errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this error was caused by malformed caller input
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidRecordId(_)
                | Self::InvalidNamespacedKey(_)
                | Self::InvalidLocation(_)
                | Self::InvalidArgument(_)
        )
    }
}

impl From<::config::ConfigError> for Error {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_invalid_input() {
        assert!(Error::InvalidRecordId("x".into()).is_invalid_input());
        assert!(Error::InvalidLocation("x".into()).is_invalid_input());
        assert!(!Error::Storage("disk".into()).is_invalid_input());
        assert!(!Error::internal("oops").is_invalid_input());
    }

    #[test]
    fn test_error_display() {
        let err: Error = NamespacedKeyError::EmptyKey.into();
        assert_eq!(err.to_string(), "invalid namespaced key: key cannot be empty");
        assert_eq!(
            Error::storage("commit failed").to_string(),
            "storage error: commit failed"
        );
    }
}
