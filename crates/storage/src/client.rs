//! Deadline-bounded, failure-absorbing store client.
//!
//! [`StoreClient`] is the only way the security services talk to a
//! [`StorageBackend`]. It is constructed once and passed explicitly to every
//! service, so tests substitute a [`MemoryBackend`](crate::MemoryBackend) by
//! handing in a different backend.
//!
//! # Degradation
//!
//! Every call is bounded by a deadline. A call that fails or times out is
//! logged at `warn` and never surfaces as an error:
//!
//! | Operation | Result on failure |
//! |-----------|-------------------|
//! | `get`, `get_json`, `get_string` | `None` |
//! | `keys` | empty list |
//! | `set*`, `delete` | `false` |
//! | `exists` | `false` when [`FailOpen`], `true` when [`FailClosed`] |
//!
//! `exists` is what the services use for security flags (account locks,
//! revoked tokens), so the policy decides whether an unreachable store lets
//! requests through or blocks them.
//!
//! [`FailOpen`]: FailurePolicy::FailOpen
//! [`FailClosed`]: FailurePolicy::FailClosed

use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    backend::StorageBackend,
    error::{ConfigError, StorageError, StorageResult},
};

/// Default deadline applied to each store call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// What a security-flag lookup reports when the store cannot answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat the flag as absent (not locked, not revoked). Favors availability.
    #[default]
    FailOpen,
    /// Treat the flag as present (locked, revoked). Favors security.
    FailClosed,
}

impl FailurePolicy {
    /// Value reported by [`StoreClient::exists`] when the store call fails.
    #[must_use]
    pub fn flag_on_failure(self) -> bool {
        matches!(self, Self::FailClosed)
    }
}

/// Configuration for [`StoreClient`].
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreClientConfig {
    /// Deadline for a single store call.
    #[serde(with = "humantime_serde", default = "default_operation_timeout")]
    #[builder(default = DEFAULT_OPERATION_TIMEOUT)]
    pub operation_timeout: Duration,

    /// Behavior of security-flag lookups when the store is unavailable.
    #[serde(default)]
    #[builder(default)]
    pub failure_policy: FailurePolicy,
}

fn default_operation_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

impl Default for StoreClientConfig {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl StoreClientConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MustBePositive`] if `operation_timeout` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "store.operation_timeout",
                value: format!("{:?}", self.operation_timeout),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StoreClientMetrics {
    calls: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    decode_failures: AtomicU64,
}

/// Point-in-time view of the client's call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreClientMetricsSnapshot {
    /// Store calls issued.
    pub calls: u64,
    /// Calls that returned a backend error.
    pub failures: u64,
    /// Calls abandoned at the deadline.
    pub timeouts: u64,
    /// Stored values that could not be decoded.
    pub decode_failures: u64,
}

impl StoreClientMetricsSnapshot {
    /// Calls that were answered with a degraded result.
    #[must_use]
    pub fn degraded(&self) -> u64 {
        self.failures + self.timeouts + self.decode_failures
    }
}

/// Shared store handle used by every security service.
///
/// Cloning is cheap; clones share the backend and counters.
///
/// # Example
///
/// ```
/// use std::{sync::Arc, time::Duration};
/// use warden_storage::{MemoryBackend, StoreClient};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = StoreClient::new(Arc::new(MemoryBackend::new()));
///
/// let key = "account_locked:email:a@x.com";
/// assert!(store.set_with_ttl(key, "1", Duration::from_secs(3600)).await);
/// assert!(store.exists(key).await);
/// # });
/// ```
#[derive(Clone)]
pub struct StoreClient {
    backend: Arc<dyn StorageBackend>,
    config: StoreClientConfig,
    metrics: Arc<StoreClientMetrics>,
}

impl fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient").field("config", &self.config).finish_non_exhaustive()
    }
}

impl StoreClient {
    /// Creates a client with the default deadline and [`FailurePolicy::FailOpen`].
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_config(backend, StoreClientConfig::default())
    }

    /// Creates a client with an explicit configuration.
    pub fn with_config(backend: Arc<dyn StorageBackend>, config: StoreClientConfig) -> Self {
        Self { backend, config, metrics: Arc::new(StoreClientMetrics::default()) }
    }

    /// Returns a handle that applies `deadline` to each call instead of the
    /// configured default. Counters stay shared with `self`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        let mut config = self.config.clone();
        config.operation_timeout = deadline;
        Self { backend: Arc::clone(&self.backend), config, metrics: Arc::clone(&self.metrics) }
    }

    /// The active failure policy.
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.config.failure_policy
    }

    /// The active per-call deadline.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        self.config.operation_timeout
    }

    /// Reads a raw value. `None` on miss or failure.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.call("get", key, self.backend.get(key)).await.flatten()
    }

    /// Reads a UTF-8 value. Non-UTF-8 bytes read as a miss.
    pub async fn get_string(&self, key: &str) -> Option<String> {
        let raw = self.get(key).await?;
        match String::from_utf8(raw.to_vec()) {
            Ok(text) => Some(text),
            Err(err) => {
                self.record_decode_failure(key, &err);
                None
            },
        }
    }

    /// Reads and decodes a JSON value. Undecodable values read as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                self.record_decode_failure(key, &err);
                None
            },
        }
    }

    /// Writes a value with no expiry. Returns whether the write was acknowledged.
    pub async fn set(&self, key: &str, value: impl Into<Vec<u8>>) -> bool {
        self.call("set", key, self.backend.set(key, value.into())).await.is_some()
    }

    /// Writes a value that expires after `ttl`.
    pub async fn set_with_ttl(&self, key: &str, value: impl Into<Vec<u8>>, ttl: Duration) -> bool {
        self.call("set_with_ttl", key, self.backend.set_with_ttl(key, value.into(), ttl))
            .await
            .is_some()
    }

    /// Encodes `value` as JSON and writes it with no expiry.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match self.encode(key, value) {
            Some(bytes) => self.set(key, bytes).await,
            None => false,
        }
    }

    /// Encodes `value` as JSON and writes it with `ttl`.
    pub async fn set_json_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> bool {
        match self.encode(key, value) {
            Some(bytes) => self.set_with_ttl(key, bytes, ttl).await,
            None => false,
        }
    }

    /// Deletes a key. Returns `true` only if a live key was removed.
    pub async fn delete(&self, key: &str) -> bool {
        self.call("delete", key, self.backend.delete(key)).await.unwrap_or(false)
    }

    /// Checks for a live key, falling back to the [`FailurePolicy`] when the
    /// store cannot answer.
    pub async fn exists(&self, key: &str) -> bool {
        self.call("exists", key, self.backend.exists(key))
            .await
            .unwrap_or_else(|| self.config.failure_policy.flag_on_failure())
    }

    /// Lists live keys under `prefix`. Empty on failure.
    pub async fn keys(&self, prefix: &str) -> Vec<String> {
        self.call("keys", prefix, self.backend.keys(prefix)).await.unwrap_or_default()
    }

    /// Probes the backend, surfacing the failure for readiness checks.
    ///
    /// # Errors
    ///
    /// Returns the backend error, or [`StorageError::Timeout`] if the check
    /// exceeds the deadline.
    pub async fn health_check(&self) -> StorageResult<()> {
        tokio::time::timeout(self.config.operation_timeout, self.backend.health_check())
            .await
            .map_err(|_| StorageError::timeout())?
    }

    /// Returns a snapshot of the call counters.
    #[must_use]
    pub fn metrics(&self) -> StoreClientMetricsSnapshot {
        StoreClientMetricsSnapshot {
            calls: self.metrics.calls.load(Ordering::Relaxed),
            failures: self.metrics.failures.load(Ordering::Relaxed),
            timeouts: self.metrics.timeouts.load(Ordering::Relaxed),
            decode_failures: self.metrics.decode_failures.load(Ordering::Relaxed),
        }
    }

    async fn call<T>(
        &self,
        op: &'static str,
        key: &str,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> Option<T> {
        self.metrics.calls.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    op,
                    key,
                    error = %err,
                    transient = err.is_transient(),
                    policy = ?self.config.failure_policy,
                    "store call failed, degrading"
                );
                None
            },
            Err(_) => {
                self.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    op,
                    key,
                    deadline_ms = self.config.operation_timeout.as_millis() as u64,
                    policy = ?self.config.failure_policy,
                    "store call timed out, degrading"
                );
                None
            },
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Option<Vec<u8>> {
        match serde_json::to_vec(value) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to encode value for store");
                None
            },
        }
    }

    fn record_decode_failure(&self, key: &str, err: &dyn std::error::Error) {
        self.metrics.decode_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(key, error = %err, "stored value could not be decoded");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{MemoryBackend, testutil::FailingBackend};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        user_id: String,
        count: u32,
    }

    #[tokio::test]
    async fn json_round_trip_through_memory_backend() {
        let store = StoreClient::new(Arc::new(MemoryBackend::new()));
        let record = Record { user_id: "u1".into(), count: 3 };

        assert!(store.set_json_with_ttl("rec", &record, Duration::from_secs(60)).await);
        assert_eq!(store.get_json::<Record>("rec").await, Some(record));
    }

    #[tokio::test]
    async fn undecodable_json_reads_as_miss() {
        let store = StoreClient::new(Arc::new(MemoryBackend::new()));
        assert!(store.set("rec", "not json").await);

        assert_eq!(store.get_json::<Record>("rec").await, None);
        assert_eq!(store.metrics().decode_failures, 1);
    }

    #[tokio::test]
    async fn failing_backend_degrades_to_misses() {
        let store = StoreClient::new(Arc::new(FailingBackend::new()));

        assert_eq!(store.get("k").await, None);
        assert!(!store.set("k", "v").await);
        assert!(!store.delete("k").await);
        assert!(store.keys("k").await.is_empty());
        assert!(!store.exists("k").await, "fail-open reports flags as absent");
        assert!(store.health_check().await.is_err());

        let metrics = store.metrics();
        assert_eq!(metrics.failures, 5);
        assert_eq!(metrics.degraded(), 5);
    }

    #[tokio::test]
    async fn fail_closed_reports_flags_as_present() {
        let config = StoreClientConfig::builder().failure_policy(FailurePolicy::FailClosed).build();
        let store = StoreClient::with_config(Arc::new(FailingBackend::new()), config);

        assert!(store.exists("account_locked:email:a@x.com").await);
        assert_eq!(store.get("session:abc").await, None, "reads still miss");
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: StoreClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.operation_timeout, DEFAULT_OPERATION_TIMEOUT);
        assert_eq!(config.failure_policy, FailurePolicy::FailOpen);

        let config: StoreClientConfig =
            serde_json::from_str(r#"{"operation_timeout":"250ms","failure_policy":"fail_closed"}"#)
                .unwrap();
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = StoreClientConfig::builder().operation_timeout(Duration::ZERO).build();
        assert!(matches!(config.validate(), Err(ConfigError::MustBePositive { .. })));
    }
}
