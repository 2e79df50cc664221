//! Configuration for the Redis storage backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RedisStorageError, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_SCAN_BATCH: usize = 100;

/// Connection settings for [`RedisBackend`](crate::RedisBackend).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use warden_storage_redis::RedisBackendConfig;
///
/// let config = RedisBackendConfig::builder()
///     .url("redis://127.0.0.1:6379/0")
///     .connect_timeout(Duration::from_secs(2))
///     .build()
///     .unwrap();
/// assert_eq!(config.scan_batch(), 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisBackendConfig {
    pub(crate) url: String,

    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// `COUNT` hint passed to each `SCAN` round trip.
    #[serde(default = "default_scan_batch")]
    pub(crate) scan_batch: usize,
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_scan_batch() -> usize {
    DEFAULT_SCAN_BATCH
}

#[bon::bon]
impl RedisBackendConfig {
    #[builder]
    pub fn new(
        #[builder(into)] url: String,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(default = DEFAULT_SCAN_BATCH)] scan_batch: usize,
    ) -> Result<Self> {
        let config = Self { url, connect_timeout, scan_batch };
        config.validate()?;
        Ok(config)
    }
}

impl RedisBackendConfig {
    /// Checks values that deserialization alone cannot.
    ///
    /// # Errors
    ///
    /// Returns [`RedisStorageError::Config`] for an empty or non-`redis` URL,
    /// a zero connect timeout, or a zero scan batch.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("redis://") || self.url.starts_with("rediss://")) {
            return Err(RedisStorageError::Config(format!(
                "url must use the redis:// or rediss:// scheme, got {:?}",
                self.url
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(RedisStorageError::Config("connect_timeout must be positive".into()));
        }
        if self.scan_batch == 0 {
            return Err(RedisStorageError::Config("scan_batch must be at least 1".into()));
        }
        Ok(())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn scan_batch(&self) -> usize {
        self.scan_batch
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let config = RedisBackendConfig::builder().url("redis://localhost").build().unwrap();
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.scan_batch(), DEFAULT_SCAN_BATCH);
    }

    #[test]
    fn builder_rejects_foreign_scheme() {
        let err = RedisBackendConfig::builder().url("http://localhost").build().unwrap_err();
        assert!(err.to_string().contains("redis://"));
    }

    #[test]
    fn deserializes_humantime_durations() {
        let config: RedisBackendConfig =
            serde_json::from_str(r#"{"url":"rediss://cache:6380","connect_timeout":"750ms"}"#)
                .unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_millis(750));
        config.validate().unwrap();
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result =
            serde_json::from_str::<RedisBackendConfig>(r#"{"url":"redis://x","pool":4}"#);
        assert!(result.is_err());
    }
}
