//! Storage backend trait definition.
//!
//! This module defines the [`StorageBackend`] trait, the minimal key-value
//! interface every security service is built on. All implementations
//! ([`MemoryBackend`](crate::MemoryBackend), `RedisBackend` in
//! `warden-storage-redis`) implement it.
//!
//! # Design Philosophy
//!
//! - **String keys, byte values**: keys follow the colon-separated key-space in
//!   [`keys`](crate::keys); values carry no assumed encoding.
//! - **Single-key atomicity only**: there are no transactions. Each call is
//!   individually atomic, nothing is coordinated across keys.
//! - **TTL-first**: almost every record the services write expires on its own.
//! - **Prefix listing**: [`keys`](StorageBackend::keys) is a scan, intended
//!   for small namespaces.
//!
//! Backends return [`StorageError`](crate::StorageError) on failure. Services do not call a backend
//! directly; they go through [`StoreClient`](crate::StoreClient), which applies
//! deadlines and the configured failure policy.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Abstract key-value store.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Retrieve a single value by key |
/// | [`set`](StorageBackend::set) | Store a value without expiry |
/// | [`set_with_ttl`](StorageBackend::set_with_ttl) | Store with automatic expiration |
/// | [`delete`](StorageBackend::delete) | Remove a key |
/// | [`exists`](StorageBackend::exists) | Check whether a live key is present |
/// | [`keys`](StorageBackend::keys) | List live keys sharing a prefix |
/// | [`health_check`](StorageBackend::health_check) | Verify backend availability |
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use warden_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.set_with_ttl("session:abc", b"{}".to_vec(), Duration::from_secs(60)).await.unwrap();
/// assert_eq!(backend.get("session:abc").await.unwrap(), Some(Bytes::from("{}")));
/// assert_eq!(backend.keys("session:").await.unwrap(), vec!["session:abc".to_owned()]);
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists and has not expired
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Stores a value with no expiry.
    ///
    /// Overwrites any existing value and clears any TTL previously attached
    /// to the key.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Stores a value that expires after `ttl`.
    ///
    /// Re-setting a key replaces both its value and its TTL, which is how the
    /// brute-force counters roll their window forward.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Deletes a key.
    ///
    /// Returns `Ok(true)` if a live key was removed and `Ok(false)` if there
    /// was nothing to remove.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Returns whether a live (non-expired) key is present.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Lists all live keys starting with `prefix`, in lexicographic order.
    ///
    /// This is a full scan of the prefix and is meant for small namespaces
    /// (audit records, per-user indexes), not hot paths.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Verifies the backend can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}

#[async_trait]
impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        (**self).set(key, value).await
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        (**self).exists(key).await
    }

    async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        (**self).keys(prefix).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        (**self).health_check().await
    }
}
