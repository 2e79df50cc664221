//! Security event logging.
//!
//! Every service reports what it did through a [`SecurityEventLogger`].
//! Logging never fails the caller: implementations swallow or report their
//! own delivery problems.
//!
//! # Architecture
//!
//! - [`TracingSecurityLogger`]: emits structured `tracing` events on the `warden::security` and
//!   `warden::audit` targets, at a level derived from the event severity, for log aggregation and
//!   SIEM forwarding.
//! - [`MemorySecurityLogger`]: keeps events in memory so tests can assert on them.
//!
//! # Usage
//!
//! ```
//! use warden_authn::security_log::{SecurityEvent, SecurityEventLogger, TracingSecurityLogger};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let logger = TracingSecurityLogger;
//! logger
//!     .log(&SecurityEvent::TokenRefreshed { user_id: "42".into() })
//!     .await;
//! # });
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    audit::AuditEvent,
    error::LoginRejection,
    types::{IdentifierKind, Role, Severity},
};

/// A security-relevant occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityEvent {
    LoginAttempt {
        email: String,
        user_id: Option<String>,
        success: bool,
        /// Set on failure only.
        reason: Option<LoginRejection>,
        ip: String,
        user_agent: Option<String>,
    },
    AccountLockout {
        identifier: String,
        kind: IdentifierKind,
        attempts: u64,
    },
    SessionCreated {
        user_id: String,
        session_id: String,
        ip: String,
    },
    SessionRevoked {
        user_id: String,
        session_id: String,
        reason: &'static str,
    },
    TokenRefreshed {
        user_id: String,
    },
    PrivilegeChange {
        actor_id: String,
        target_id: String,
        from: Role,
        to: Role,
    },
    SuspiciousActivity {
        subject: String,
        activity: String,
        source: String,
        pattern: &'static str,
        count: u64,
        threshold: u64,
        severity: Severity,
        details: serde_json::Value,
    },
    SecurityViolation {
        subject: String,
        violation: String,
        source: String,
        details: serde_json::Value,
    },
}

impl SecurityEvent {
    /// Stable event name used as the log message and for filtering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginAttempt { success: true, .. } => "login_success",
            Self::LoginAttempt { success: false, .. } => "login_failure",
            Self::AccountLockout { .. } => "account_lockout",
            Self::SessionCreated { .. } => "session_created",
            Self::SessionRevoked { .. } => "session_revoked",
            Self::TokenRefreshed { .. } => "token_refreshed",
            Self::PrivilegeChange { .. } => "privilege_change",
            Self::SuspiciousActivity { .. } => "suspicious_activity",
            Self::SecurityViolation { .. } => "security_violation",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::LoginAttempt { success: true, .. }
            | Self::SessionCreated { .. }
            | Self::SessionRevoked { .. }
            | Self::TokenRefreshed { .. } => Severity::Low,
            Self::LoginAttempt { success: false, .. } => Severity::Medium,
            Self::AccountLockout { .. } | Self::PrivilegeChange { .. } => Severity::High,
            Self::SuspiciousActivity { severity, .. } => *severity,
            Self::SecurityViolation { .. } => Severity::Critical,
        }
    }
}

/// Sink for security events and audit records.
#[async_trait]
pub trait SecurityEventLogger: Send + Sync {
    /// Records a security event.
    async fn log(&self, event: &SecurityEvent);

    /// Mirrors a persisted audit record.
    async fn log_audit(&self, event: &AuditEvent);
}

#[async_trait]
impl<L: SecurityEventLogger + ?Sized> SecurityEventLogger for Arc<L> {
    async fn log(&self, event: &SecurityEvent) {
        (**self).log(event).await;
    }

    async fn log_audit(&self, event: &AuditEvent) {
        (**self).log_audit(event).await;
    }
}

/// Logger that emits structured `tracing` events.
///
/// Security events go to target `warden::security`; `Low` severity is logged
/// at `INFO`, `Medium` and `High` at `WARN`, `Critical` at `ERROR`. Audit
/// records go to target `warden::audit` at `INFO`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSecurityLogger;

macro_rules! security_event {
    ($level:expr, $event:expr) => {
        tracing::event!(
            target: "warden::security",
            $level,
            security.event = $event.name(),
            security.severity = %$event.severity(),
            security.detail = ?$event,
            "security_event"
        )
    };
}

#[async_trait]
impl SecurityEventLogger for TracingSecurityLogger {
    async fn log(&self, event: &SecurityEvent) {
        match event.severity() {
            Severity::Low => security_event!(tracing::Level::INFO, event),
            Severity::Medium | Severity::High => security_event!(tracing::Level::WARN, event),
            Severity::Critical => security_event!(tracing::Level::ERROR, event),
        }
    }

    async fn log_audit(&self, event: &AuditEvent) {
        tracing::event!(
            target: "warden::audit",
            tracing::Level::INFO,
            audit.id = %event.id,
            audit.timestamp = %event.timestamp.to_rfc3339(),
            audit.user_id = %event.user_id,
            audit.action = %event.action,
            audit.resource = %event.resource,
            audit.resource_id = event.resource_id.as_deref().unwrap_or(""),
            audit.severity = %event.severity,
            audit.ip = %event.ip,
            audit.details = %event.details,
            "audit_event"
        );
    }
}

/// Logger that keeps everything in memory.
///
/// Clones share the same buffers.
#[derive(Debug, Clone, Default)]
pub struct MemorySecurityLogger {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
    audits: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemorySecurityLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the security events logged so far, oldest first.
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().clone()
    }

    /// Snapshot of the audit records mirrored so far, oldest first.
    pub fn audits(&self) -> Vec<AuditEvent> {
        self.audits.lock().clone()
    }

    /// Number of security events with the given [`name`](SecurityEvent::name).
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.audits.lock().clear();
    }
}

#[async_trait]
impl SecurityEventLogger for MemorySecurityLogger {
    async fn log(&self, event: &SecurityEvent) {
        self.events.lock().push(event.clone());
    }

    async fn log_audit(&self, event: &AuditEvent) {
        self.audits.lock().push(event.clone());
    }
}
