//! Redis-backed [`StorageBackend`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use warden_storage::{StorageBackend, StorageError, StorageResult};

use crate::{
    config::RedisBackendConfig,
    error::{RedisStorageError, Result},
};

/// [`StorageBackend`] over a shared Redis connection.
///
/// Uses a [`ConnectionManager`], which multiplexes requests over one
/// connection and re-establishes it after a drop. Calls that fail while the
/// connection is down surface as [`StorageError::Connection`]; they are not
/// retried here.
#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    scan_batch: usize,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").field("scan_batch", &self.scan_batch).finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`RedisStorageError::Config`] if the URL cannot be parsed or
    /// the connection is not established within `connect_timeout`, and
    /// [`RedisStorageError::Redis`] if the server refuses the connection.
    pub async fn connect(config: RedisBackendConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisStorageError::Config(format!("invalid Redis URL: {e}")))?;

        let connect = ConnectionManager::new(client);
        let connection = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| {
                RedisStorageError::Config(format!(
                    "Redis connection not established within {:?}",
                    config.connect_timeout
                ))
            })??;

        tracing::info!(scan_batch = config.scan_batch, "Redis connection established");
        Ok(Self { connection, scan_batch: config.scan_batch })
    }
}

/// Escapes glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
pub(crate) fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Millisecond TTL for `SET ... PX`, at least 1.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn storage_err(err: redis::RedisError) -> StorageError {
    RedisStorageError::from(err).into()
}

#[async_trait]
impl StorageBackend for RedisBackend {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(storage_err)?;
        Ok(value.map(Bytes::from))
    }

    #[tracing::instrument(level = "trace", skip(self, value))]
    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        // Plain SET discards any existing TTL.
        conn.set::<_, _, ()>(key, value).await.map_err(storage_err)
    }

    #[tracing::instrument(level = "trace", skip(self, value))]
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        if ttl.is_zero() {
            // Redis rejects PX 0; a zero TTL is already expired.
            conn.del::<_, ()>(key).await.map_err(storage_err)?;
            return Ok(());
        }
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(storage_err)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut conn = self.connection.clone();
        let removed: u64 = conn.del(key).await.map_err(storage_err)?;
        Ok(removed > 0)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let mut conn = self.connection.clone();
        conn.exists(key).await.map_err(storage_err)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let pattern = prefix_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_batch)
                .query_async(&mut conn)
                .await
                .map_err(storage_err)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once and in no particular order.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn health_check(&self) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await.map_err(storage_err)?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StorageError::internal(format!("unexpected PING reply: {pong}")))
        }
    }
}
