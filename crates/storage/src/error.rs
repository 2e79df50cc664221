//! Storage error types and result alias.
//!
//! Every backend maps its internal failures onto [`StorageError`]. Callers in
//! the security services never see these errors directly: the
//! [`StoreClient`](crate::StoreClient) absorbs them and degrades according to
//! its [`FailurePolicy`](crate::FailurePolicy).
//!
//! # Error Types
//!
//! - [`StorageError::Connection`] - Network or connection-related failures
//! - [`StorageError::Serialization`] - Data encoding/decoding failures
//! - [`StorageError::Internal`] - Backend-specific internal errors
//! - [`StorageError::Timeout`] - Operation exceeded its deadline
//!
//! # Example
//!
//! ```
//! use warden_storage::{StorageError, StorageResult};
//!
//! fn read_reply(reply: Option<Vec<u8>>) -> StorageResult<Option<Vec<u8>>> {
//!     match reply {
//!         Some(bytes) if bytes.is_empty() => Err(StorageError::internal("empty reply")),
//!         other => Ok(other),
//!     }
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute, enabling
/// debugging tools to display the full error context.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Connection or network error.
    ///
    /// The store could not be reached: connection refused, DNS failure,
    /// broken pipe and the like.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    ///
    /// A stored value could not be decoded, or a record could not be encoded
    /// for storage. Usually indicates a schema mismatch between writers.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation exceeded its deadline.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` if the failure is an availability problem (the store
    /// could not be reached in time) rather than a data problem.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric field is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// Minimum accepted value.
        min: String,
        /// Value that was supplied.
        value: String,
    },

    /// A duration field must be strictly positive.
    #[error("{field} must be positive, got {value}")]
    MustBePositive {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was supplied.
        value: String,
    },

    /// A field holds a value that cannot be used.
    #[error("{field} is invalid: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(StorageError::timeout().to_string(), "Operation timeout");
        assert_eq!(StorageError::connection("refused").to_string(), "Connection error: refused");
    }

    #[test]
    fn transient_classification() {
        assert!(StorageError::timeout().is_transient());
        assert!(StorageError::connection("down").is_transient());
        let decode = serde_json::from_slice::<u64>(b"nope").unwrap_err();
        assert!(!StorageError::serialization_with_source("bad reply", decode).is_transient());
        assert!(!StorageError::internal("backend bug").is_transient());
    }

    #[test]
    fn source_chain_is_preserved() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = StorageError::connection_with_source("redis unreachable", inner);
        let source = err.source().expect("source must be preserved");
        assert_eq!(source.to_string(), "refused");
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::BelowMinimum {
            field: "max_failed_attempts",
            min: "1".into(),
            value: "0".into(),
        };
        assert_eq!(err.to_string(), "max_failed_attempts must be at least 1, got 0");
    }
}
