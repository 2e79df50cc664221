//! Redis-backed implementation of [`StorageBackend`](warden_storage::StorageBackend) for
//! warden.
//!
//! This crate provides [`RedisBackend`], the production backend for the
//! shared store. Every security service reaches it through a
//! [`StoreClient`](warden_storage::StoreClient), which adds deadlines and the
//! fail-open/fail-closed policy on top.
//!
//! # Mapping
//!
//! | Trait method | Redis command |
//! |--------------|---------------|
//! | `get` | `GET` |
//! | `set` | `SET` (clears TTL) |
//! | `set_with_ttl` | `SET ... PX <ms>` |
//! | `delete` | `DEL` |
//! | `exists` | `EXISTS` |
//! | `keys` | `SCAN MATCH <prefix>*` until the cursor returns to 0 |
//! | `health_check` | `PING` |
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires a running Redis server.
//! use std::sync::Arc;
//! use warden_storage::StoreClient;
//! use warden_storage_redis::{RedisBackend, RedisBackendConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisBackendConfig::builder().url("redis://127.0.0.1:6379").build()?;
//!     let backend = RedisBackend::connect(config).await?;
//!
//!     let store = StoreClient::new(Arc::new(backend));
//!     store.health_check().await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

mod backend;
mod config;
mod error;

pub use backend::RedisBackend;
pub use config::RedisBackendConfig;
pub use error::{RedisStorageError, Result};
