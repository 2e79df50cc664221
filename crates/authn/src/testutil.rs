//! Shared test utilities for the security services.
//!
//! Provides in-memory stand-ins for the external collaborators
//! ([`MemoryUserDirectory`], [`PlaintextHasher`]), a [`TestHarness`] wiring a
//! full [`AuthService`] over a manually clocked memory store, and helpers for
//! crafting hostile JWTs. Feature-gated behind `testutil` to keep it out of
//! production builds.
//!
//! ```toml
//! [dev-dependencies]
//! warden-authn = { path = "../authn", features = ["testutil"] }
//! ```

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use warden_storage::{ManualClock, MemoryBackend, StorageBackend, testutil::manual_backend};

use crate::{
    config::AuthConfig,
    directory::{CredentialHasher, DirectoryError, NewUser, UserDirectory, UserRecord},
    error::AuthError,
    orchestrator::AuthService,
    security_log::MemorySecurityLogger,
    token::SigningKeys,
    types::{Role, normalize_email},
};

/// User directory backed by a map. Clones share the same users.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserDirectory {
    users: Arc<Mutex<BTreeMap<String, UserRecord>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an active user whose password hashes with [`PlaintextHasher`].
    pub fn add_user(&self, email: &str, password: &str, role: Role) -> UserRecord {
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let user = UserRecord {
            id: id.clone(),
            email: normalize_email(email),
            name: format!("User {id}"),
            role,
            active: true,
            password_hash: PlaintextHasher::encode(password),
        };
        self.users.lock().insert(id, user.clone());
        user
    }

    pub fn set_active(&self, id: &str, active: bool) {
        if let Some(user) = self.users.lock().get_mut(id) {
            user.active = active;
        }
    }

    pub fn remove(&self, id: &str) -> Option<UserRecord> {
        self.users.lock().remove(id)
    }

    pub fn user(&self, id: &str) -> Option<UserRecord> {
        self.users.lock().get(id).cloned()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self.users.lock().values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Ok(self.user(id))
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, DirectoryError> {
        let mut users = self.users.lock();
        if users.values().any(|u| u.email == user.email) {
            return Err(DirectoryError::Conflict { email: user.email });
        }
        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let record = UserRecord {
            id: id.clone(),
            email: user.email,
            name: user.name,
            role: user.role,
            active: true,
            password_hash: user.password_hash,
        };
        users.insert(id, record.clone());
        Ok(record)
    }

    async fn update_role(
        &self,
        id: &str,
        role: Role,
    ) -> Result<Option<UserRecord>, DirectoryError> {
        let mut users = self.users.lock();
        Ok(users.get_mut(id).map(|user| {
            user.role = role;
            user.clone()
        }))
    }
}

/// Stores secrets as `plain:{secret}` and counts verifications, so tests can
/// assert that a locked login never reached the password check.
#[derive(Debug, Clone, Default)]
pub struct PlaintextHasher {
    verify_calls: Arc<AtomicUsize>,
}

impl PlaintextHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(secret: &str) -> String {
        format!("plain:{secret}")
    }

    /// Number of [`verify`](CredentialHasher::verify) calls so far.
    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialHasher for PlaintextHasher {
    async fn verify(&self, secret: &str, stored: &str) -> bool {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        stored == Self::encode(secret)
    }

    async fn hash(&self, secret: &str) -> Result<String, AuthError> {
        Ok(Self::encode(secret))
    }
}

/// A fully wired [`AuthService`] plus handles on everything behind it.
#[derive(Debug, Clone)]
pub struct TestHarness {
    pub service: AuthService,
    pub backend: MemoryBackend,
    pub clock: ManualClock,
    pub logger: MemorySecurityLogger,
    pub directory: MemoryUserDirectory,
    pub hasher: PlaintextHasher,
}

impl TestHarness {
    /// Harness with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if key generation fails.
    pub fn new() -> Self {
        Self::with_config(AuthConfig::default())
    }

    /// # Panics
    ///
    /// Panics if `config` is invalid or key generation fails.
    #[allow(clippy::expect_used)]
    pub fn with_config(config: AuthConfig) -> Self {
        let (backend, clock) = manual_backend();
        Self::over(Arc::new(backend.clone()), backend, clock, config)
    }

    /// Harness whose service talks to `store` instead of `backend` directly,
    /// for wrapping the memory backend in a fault-injecting one.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid or key generation fails.
    #[allow(clippy::expect_used)]
    pub fn over(
        store: Arc<dyn StorageBackend>,
        backend: MemoryBackend,
        clock: ManualClock,
        config: AuthConfig,
    ) -> Self {
        let logger = MemorySecurityLogger::new();
        let directory = MemoryUserDirectory::new();
        let hasher = PlaintextHasher::new();

        let service = AuthService::builder()
            .config(config)
            .backend(store)
            .keys(Arc::new(SigningKeys::generate().expect("key generation")))
            .directory(Arc::new(directory.clone()))
            .hasher(Arc::new(hasher.clone()))
            .clock(Arc::new(clock.clone()))
            .logger(Arc::new(logger.clone()))
            .build()
            .expect("valid test configuration");

        Self { service, backend, clock, logger, directory, hasher }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The result is `{header_b64}.{payload_b64}.` with an empty signature, for
/// testing rejection of forged tokens (`alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
#[allow(clippy::expect_used)]
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given
/// [`AuthError`] variant.
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use warden_authn::assert_auth_error;
/// use warden_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::TokenExpired);
/// assert_auth_error!(result, TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}
