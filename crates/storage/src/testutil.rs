//! Shared test utilities for store-backed services.
//!
//! This module provides backends that misbehave on purpose, a harness pairing
//! a [`MemoryBackend`] with a [`ManualClock`], and assertion macros for
//! [`StorageResult`] values. It is feature-gated behind `testutil` to prevent
//! leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! warden-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use warden_storage::testutil::{FailingBackend, OutageBackend, manual_store};
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    StorageBackend,
    client::StoreClient,
    clock::ManualClock,
    error::{StorageError, StorageResult},
    memory::MemoryBackend,
};

/// Backend whose every call fails with a connection error.
#[derive(Debug, Clone, Default)]
pub struct FailingBackend;

impl FailingBackend {
    pub fn new() -> Self {
        Self
    }
}

fn unreachable_store() -> StorageError {
    StorageError::connection("store unreachable")
}

#[async_trait]
impl StorageBackend for FailingBackend {
    async fn get(&self, _key: &str) -> StorageResult<Option<Bytes>> {
        Err(unreachable_store())
    }

    async fn set(&self, _key: &str, _value: Vec<u8>) -> StorageResult<()> {
        Err(unreachable_store())
    }

    async fn set_with_ttl(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> StorageResult<()> {
        Err(unreachable_store())
    }

    async fn delete(&self, _key: &str) -> StorageResult<bool> {
        Err(unreachable_store())
    }

    async fn exists(&self, _key: &str) -> StorageResult<bool> {
        Err(unreachable_store())
    }

    async fn keys(&self, _prefix: &str) -> StorageResult<Vec<String>> {
        Err(unreachable_store())
    }

    async fn health_check(&self) -> StorageResult<()> {
        Err(unreachable_store())
    }
}

/// Wraps a backend and fails every call while an outage is in progress.
///
/// Clones share the outage switch, so a test can keep one handle and pass
/// another to the code under test.
#[derive(Debug, Clone)]
pub struct OutageBackend<B> {
    inner: B,
    down: Arc<AtomicBool>,
}

impl<B> OutageBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner, down: Arc::new(AtomicBool::new(false)) }
    }

    /// Starts or ends the outage.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn check(&self) -> StorageResult<()> {
        if self.down.load(Ordering::SeqCst) { Err(unreachable_store()) } else { Ok(()) }
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for OutageBackend<B> {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.check()?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.check()?;
        self.inner.keys(prefix).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.check()?;
        self.inner.health_check().await
    }
}

/// Wraps a backend and delays every call, for deadline tests.
#[derive(Debug, Clone)]
pub struct SlowBackend<B> {
    inner: B,
    delay: Duration,
}

impl<B> SlowBackend<B> {
    pub fn new(inner: B, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for SlowBackend<B> {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value).await
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.exists(key).await
    }

    async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        tokio::time::sleep(self.delay).await;
        self.inner.keys(prefix).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.health_check().await
    }
}

/// Creates a [`MemoryBackend`] driven by a fresh [`ManualClock`].
pub fn manual_backend() -> (MemoryBackend, ManualClock) {
    let clock = ManualClock::new();
    (MemoryBackend::with_clock(Arc::new(clock.clone())), clock)
}

/// Creates a [`StoreClient`] over a manually clocked [`MemoryBackend`].
///
/// The backend is returned too so tests can inspect raw keys and TTLs.
pub fn manual_store() -> (StoreClient, MemoryBackend, ManualClock) {
    let (backend, clock) = manual_backend();
    let store = StoreClient::new(Arc::new(backend.clone()));
    (store, backend, clock)
}

/// Assert that a [`StorageResult`] is `Ok`.
///
/// Returns the inner value on success, panics with a descriptive message
/// on failure.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use warden_storage::{assert_storage_ok, StorageResult};
///
/// let result: StorageResult<i32> = Ok(42);
/// let value = assert_storage_ok!(result);
/// assert_eq!(value, 42);
/// ```
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => panic!("expected Ok, got error: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => panic!("{}: expected Ok, got error: {e:?}", $msg),
        }
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::Timeout`].
#[macro_export]
macro_rules! assert_timeout {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::StorageError::Timeout)),
            "expected StorageError::Timeout, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::Connection`].
#[macro_export]
macro_rules! assert_connection_error {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::StorageError::Connection { .. })),
            "expected StorageError::Connection, got: {:?}",
            $result,
        );
    };
}
