//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`StorageBackend`] used as the test double for the shared store and for
//! single-process development setups.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Keys are stored in a [`BTreeMap`] so prefix listing is a range scan
//! - **TTL support**: Expiry is checked on every read against an injected [`Clock`], and a
//!   background task reaps expired entries
//!
//! # Example
//!
//! ```
//! use warden_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set("greeting", b"hello".to_vec()).await.unwrap();
//!     let value = backend.get("greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - The reaper runs every second on wall time; logical expiry is exact because reads check the
//!   clock themselves

use std::{collections::BTreeMap, ops::Bound, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};

use crate::{
    backend::StorageBackend,
    clock::{Clock, SystemClock, add_duration},
    error::StorageResult,
};

/// Interval between background sweeps for expired keys.
const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the reaper task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Best-effort; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data and clock.
///
/// # Time
///
/// Expiry is evaluated against the backend's [`Clock`]. Pair it with a
/// [`ManualClock`](crate::ManualClock) to move TTLs forward in tests:
///
/// ```
/// use std::{sync::Arc, time::Duration};
/// use warden_storage::{ManualClock, MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let clock = ManualClock::new();
/// let backend = MemoryBackend::with_clock(Arc::new(clock.clone()));
///
/// backend.set_with_ttl("lock", b"1".to_vec(), Duration::from_secs(60)).await.unwrap();
/// clock.advance(Duration::from_secs(61));
/// assert!(!backend.exists("lock").await.unwrap());
/// # });
/// ```
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Bytes>>>,
    ttl_data: Arc<RwLock<BTreeMap<String, DateTime<Utc>>>>,
    clock: Arc<dyn Clock>,
    /// Shared ownership of the shutdown sender. When the last clone drops,
    /// the channel closes and the reaper exits.
    shutdown_guard: Arc<ShutdownGuard>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("keys", &self.data.read().len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    /// Creates a backend driven by the system clock.
    ///
    /// Spawns the background reaper, so this must be called from within a
    /// Tokio runtime.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a backend whose TTLs are evaluated against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let backend = Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            ttl_data: Arc::new(RwLock::new(BTreeMap::new())),
            clock,
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        // The reaper only holds the maps, not the guard, so dropping every
        // handle closes the channel.
        let data = Arc::clone(&backend.data);
        let ttl_data = Arc::clone(&backend.ttl_data);
        let clock = Arc::clone(&backend.clock);
        tokio::spawn(async move {
            reap_expired_keys(data, ttl_data, clock, shutdown_rx).await;
        });

        backend
    }

    /// Explicitly signals the background reaper to stop.
    ///
    /// Optional: the task also stops when all clones of the backend are
    /// dropped.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Returns the instant at which `key` expires, if it carries a TTL.
    #[must_use]
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.ttl_data.read().get(key).copied()
    }

    /// Returns the number of physically stored keys, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn is_expired(&self, key: &str) -> bool {
        match self.ttl_data.read().get(key) {
            Some(expiry) => *expiry <= self.clock.now(),
            None => false,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Background sweep removing keys whose TTL has elapsed.
async fn reap_expired_keys(
    data: Arc<RwLock<BTreeMap<String, Bytes>>>,
    ttl_data: Arc<RwLock<BTreeMap<String, DateTime<Utc>>>>,
    clock: Arc<dyn Clock>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        select! {
            _ = sleep(REAP_INTERVAL) => {}
            _ = shutdown_rx.changed() => {
                return;
            }
        }

        let now = clock.now();
        let expired: Vec<String> = ttl_data
            .read()
            .iter()
            .filter(|(_, expiry)| **expiry <= now)
            .map(|(key, _)| key.clone())
            .collect();

        if !expired.is_empty() {
            // Fixed lock order: data then ttl_data.
            let mut data_guard = data.write();
            let mut ttl_guard = ttl_data.write();
            for key in expired {
                // A concurrent set_with_ttl may have pushed the expiry out.
                if ttl_guard.get(&key).is_some_and(|expiry| *expiry <= now) {
                    data_guard.remove(&key);
                    ttl_guard.remove(&key);
                }
            }
            tracing::trace!(remaining = data_guard.len(), "reaped expired keys");
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        if self.is_expired(key) {
            return Ok(None);
        }
        Ok(self.data.read().get(key).cloned())
    }

    #[tracing::instrument(level = "trace", skip(self, value))]
    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self.data.write();
        let mut ttl_data = self.ttl_data.write();
        data.insert(key.to_owned(), Bytes::from(value));
        // A plain set makes the key persistent.
        ttl_data.remove(key);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self, value))]
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        let expiry = add_duration(self.clock.now(), ttl);
        let mut data = self.data.write();
        let mut ttl_data = self.ttl_data.write();
        data.insert(key.to_owned(), Bytes::from(value));
        ttl_data.insert(key.to_owned(), expiry);
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let was_live = !self.is_expired(key);
        let mut data = self.data.write();
        let mut ttl_data = self.ttl_data.write();
        let removed = data.remove(key).is_some();
        ttl_data.remove(key);
        Ok(removed && was_live)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        if self.is_expired(key) {
            return Ok(false);
        }
        Ok(self.data.read().contains_key(key))
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let now = self.clock.now();
        let data = self.data.read();
        let ttl_data = self.ttl_data.read();
        let keys = data
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| ttl_data.get(key.as_str()).is_none_or(|expiry| *expiry > now))
            .map(|(key, _)| key.clone())
            .collect();
        Ok(keys)
    }

    async fn health_check(&self) -> StorageResult<()> {
        // Taking the read lock proves we are not deadlocked.
        let _unused = self.data.read();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn manual_backend() -> (MemoryBackend, ManualClock) {
        let clock = ManualClock::new();
        (MemoryBackend::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn get_set_delete() {
        let backend = MemoryBackend::new();

        backend.set("key", b"value".to_vec()).await.unwrap();
        assert_eq!(backend.get("key").await.unwrap(), Some(Bytes::from("value")));

        assert!(backend.delete("key").await.unwrap());
        assert_eq!(backend.get("key").await.unwrap(), None);
        assert!(!backend.delete("key").await.unwrap(), "second delete removes nothing");
    }

    #[tokio::test]
    async fn ttl_is_logical_before_reaping() {
        let (backend, clock) = manual_backend();

        backend.set_with_ttl("k", b"v".to_vec(), Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(9));
        assert!(backend.exists("k").await.unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(!backend.exists("k").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), None);
        // Still physically present until the reaper runs.
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn set_clears_ttl() {
        let (backend, clock) = manual_backend();

        backend.set_with_ttl("k", b"v1".to_vec(), Duration::from_secs(5)).await.unwrap();
        backend.set("k", b"v2".to_vec()).await.unwrap();
        assert_eq!(backend.expires_at("k"), None);

        clock.advance(Duration::from_secs(60));
        assert_eq!(backend.get("k").await.unwrap(), Some(Bytes::from("v2")));
    }

    #[tokio::test]
    async fn set_with_ttl_restarts_window() {
        let (backend, clock) = manual_backend();

        backend.set_with_ttl("k", b"1".to_vec(), Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(8));
        backend.set_with_ttl("k", b"2".to_vec(), Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(8));

        assert_eq!(backend.get("k").await.unwrap(), Some(Bytes::from("2")));
    }

    #[tokio::test]
    async fn keys_lists_prefix_only_and_skips_expired() {
        let (backend, clock) = manual_backend();

        backend.set("session:a", b"1".to_vec()).await.unwrap();
        backend.set_with_ttl("session:b", b"2".to_vec(), Duration::from_secs(1)).await.unwrap();
        backend.set("session:c", b"3".to_vec()).await.unwrap();
        backend.set("sessions:x", b"4".to_vec()).await.unwrap();
        backend.set("audit:1", b"5".to_vec()).await.unwrap();

        clock.advance(Duration::from_secs(2));

        let keys = backend.keys("session:").await.unwrap();
        assert_eq!(keys, vec!["session:a".to_owned(), "session:c".to_owned()]);
    }

    #[tokio::test]
    async fn delete_of_expired_key_reports_false() {
        let (backend, clock) = manual_backend();

        backend.set_with_ttl("k", b"v".to_vec(), Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(1));

        assert!(!backend.delete("k").await.unwrap());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let backend = MemoryBackend::new();
        let other = backend.clone();

        backend.set("shared", b"yes".to_vec()).await.unwrap();
        assert!(other.exists("shared").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_removes_expired_entries() {
        let (backend, clock) = manual_backend();

        backend.set_with_ttl("gone", b"v".to_vec(), Duration::from_secs(1)).await.unwrap();
        backend.set("kept", b"v".to_vec()).await.unwrap();
        clock.advance(Duration::from_secs(5));

        tokio::time::sleep(REAP_INTERVAL * 2).await;

        assert_eq!(backend.len(), 1);
        assert_eq!(backend.expires_at("gone"), None);
    }
}
