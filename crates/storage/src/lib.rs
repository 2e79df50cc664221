//! Shared key-value store abstraction for warden's security services.
//!
//! This crate provides the [`StorageBackend`] trait, the [`StoreClient`] that
//! every service talks through, and the key-space contract in [`keys`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Security services                        │
//! │  SessionStore │ BruteForceGuard │ TokenService │ AuditTrail │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      StoreClient                            │
//! │      (deadlines, fail-open/fail-closed, JSON helpers)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  StorageBackend trait                       │
//! │     (get, set, set_with_ttl, delete, exists, keys)          │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBackend│            RedisBackend                      │
//! │   (testing)  │   (production, `warden-storage-redis`)       │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use warden_storage::{MemoryBackend, StoreClient, keys};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = StoreClient::new(Arc::new(MemoryBackend::new()));
//!
//!     let key = keys::failed_attempts("email", "a@x.com");
//!     store.set_with_ttl(&key, "1", Duration::from_secs(900)).await;
//!
//!     assert_eq!(store.get_string(&key).await.as_deref(), Some("1"));
//! }
//! ```
//!
//! # Available Backends
//!
//! | Backend | Use Case | Persistence |
//! |---------|----------|-------------|
//! | [`MemoryBackend`] | Testing, development | No |
//! | `RedisBackend` (in `warden-storage-redis`) | Production | Yes |
//!
//! # Implementing a Backend
//!
//! 1. Implement the [`StorageBackend`] trait
//! 2. Honor TTLs on every read: an expired key must be invisible to `get`, `exists` and `keys`
//! 3. Map backend-specific errors to [`StorageError`]
//!
//! See the [`memory`] module source for a reference implementation.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with failing, slow and outage-switchable
//!   backends, a manually clocked store harness, and assertion macros. Enable this in
//!   `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]

pub mod backend;
pub mod client;
pub mod clock;
pub mod error;
pub mod keys;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use backend::StorageBackend;
pub use client::{
    DEFAULT_OPERATION_TIMEOUT, FailurePolicy, StoreClient, StoreClientConfig,
    StoreClientMetricsSnapshot,
};
pub use clock::{Clock, ManualClock, SystemClock, add_duration};
pub use error::{BoxError, ConfigError, StorageError, StorageResult};
pub use memory::MemoryBackend;
