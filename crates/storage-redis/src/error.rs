//! Error types for the Redis storage backend.
//!
//! This module provides error types that map between the `redis` crate's
//! errors and the generic [`StorageError`](warden_storage::StorageError) type.

use redis::{ErrorKind, RedisError};
use thiserror::Error;
use warden_storage::StorageError;

pub type Result<T> = std::result::Result<T, RedisStorageError>;

#[derive(Debug, Error)]
pub enum RedisStorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<RedisStorageError> for StorageError {
    fn from(err: RedisStorageError) -> Self {
        match err {
            RedisStorageError::Redis(source) => redis_error_to_storage_error(source),
            RedisStorageError::Config(message) => {
                StorageError::internal(format!("Config: {message}"))
            },
        }
    }
}

fn redis_error_to_storage_error(err: RedisError) -> StorageError {
    if err.is_timeout() {
        tracing::warn!(error = %err, "Redis operation timed out");
        return StorageError::timeout();
    }

    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        return StorageError::connection_with_source("Redis unreachable", err);
    }

    match err.kind() {
        ErrorKind::TypeError => {
            StorageError::serialization_with_source("Unexpected reply type", err)
        },
        ErrorKind::BusyLoadingError | ErrorKind::TryAgain | ErrorKind::MasterDown => {
            StorageError::connection_with_source("Redis temporarily unavailable", err)
        },
        ErrorKind::AuthenticationFailed => {
            StorageError::internal_with_source("Redis authentication failed", err)
        },
        _ => StorageError::internal_with_source("Redis command failed", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_errors_map_to_serialization() {
        let err = RedisError::from((ErrorKind::TypeError, "expected bulk string"));
        let storage: StorageError = RedisStorageError::from(err).into();
        assert!(matches!(storage, StorageError::Serialization { .. }));
    }

    #[test]
    fn io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let storage: StorageError = RedisStorageError::from(RedisError::from(io)).into();
        assert!(storage.is_transient());
    }

    #[test]
    fn config_errors_are_internal() {
        let storage: StorageError = RedisStorageError::Config("bad url".into()).into();
        assert!(matches!(storage, StorageError::Internal { .. }));
        assert!(!storage.is_transient());
    }
}
