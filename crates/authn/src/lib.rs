//! # Warden Authentication
//!
//! Authentication and session-security core.
//!
//! This crate provides:
//! - **Sessions**: server-side session records with a per-user index
//! - **Tokens**: EdDSA access and refresh tokens, refresh mirrors, `jti` revocation
//! - **Brute-force guard**: failed-attempt counters and account locks
//! - **Suspicious activity detection**: per-activity counters against a pattern table
//! - **Audit trail**: persisted, queryable audit records
//! - **Security event logging**: structured `tracing` events for every decision
//! - **Orchestration**: login, registration, logout, refresh and role changes
//!
//! Every component talks to the shared key-value store through a
//! [`warden_storage::StoreClient`], which never raises: an unreachable store
//! reads as a miss and the failure policy decides how security flags read.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use warden_authn::{AuthService, LoginRequest, RequestContext, SigningKeys};
//! # use warden_authn::directory::{CredentialHasher, UserDirectory};
//! use warden_storage::MemoryBackend;
//!
//! # async fn example(
//! #     directory: Arc<dyn UserDirectory>,
//! #     hasher: Arc<dyn CredentialHasher>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let service = AuthService::builder()
//!     .backend(Arc::new(MemoryBackend::new()))
//!     .keys(Arc::new(SigningKeys::generate()?))
//!     .directory(directory)
//!     .hasher(hasher)
//!     .build()?;
//!
//! let session = service
//!     .login(
//!         &LoginRequest { email: "a@x.com".into(), password: "secret".into() },
//!         &RequestContext::new("10.0.0.1"),
//!     )
//!     .await?;
//! println!("session {}", session.session_id);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod audit;
pub mod config;
pub mod detector;
pub mod directory;
pub mod error;
pub mod guard;
mod ids;
pub mod orchestrator;
pub mod security_log;
pub mod session;
pub mod token;
pub mod types;
pub mod validation;

/// Test helpers.
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use audit::{AuditAction, AuditEntry, AuditEvent, AuditQuery, AuditTrail};
pub use config::{AuditConfig, AuthConfig, DetectorConfig, GuardConfig, SessionConfig, TokenConfig};
pub use detector::{ACTIVITY_PATTERNS, ActivityPattern, SuspiciousActivityDetector};
pub use directory::{CredentialHasher, UserDirectory, UserProfile, UserRecord};
pub use error::{AuthError, LoginRejection, Result};
pub use guard::{BruteForceGuard, FailureOutcome};
pub use orchestrator::{
    ActiveSessions, AuthService, AuthSession, Credential, LoginRequest, LogoutAllOutcome,
    LogoutOutcome, LogoutRequest, Principal, RefreshedAccess, RegisterRequest,
};
pub use security_log::{
    MemorySecurityLogger, SecurityEvent, SecurityEventLogger, TracingSecurityLogger,
};
pub use session::{Session, SessionStore};
pub use token::{SigningKeys, TokenClaims, TokenPair, TokenService, TokenType, TokenValidation};
pub use types::{IdentifierKind, RequestContext, Role, Severity};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
