//! Brute-force guard: failed-attempt counters and account locks.
//!
//! Per `(kind, identifier)` the guard moves through
//! `CLEAR -> (failure)*N -> LOCKED -> CLEAR`:
//!
//! - each failure rewrites `failed_attempts:{kind}:{identifier}` with the incremented count and a
//!   fresh `attempt_window` TTL, so the window rolls forward on every failure;
//! - when the count reaches `max_failed_attempts` and no lock is held,
//!   `account_locked:{kind}:{identifier}` is written with a `lock_duration` TTL, and a lockout is
//!   logged and audited;
//! - failures while locked are still counted but never rewrite the lock, so the lock expires
//!   `lock_duration` after it was taken.
//!
//! Callers must run [`BruteForceGuard::check_lock`] before comparing
//! credentials so a locked account never reaches the password check.
//!
//! Increments are read-modify-write and not atomic across requests. Two
//! concurrent failures may both write the same count; the contract is "locked
//! after at least N failures", and the worst case is a duplicate lockout event.

use std::{fmt, sync::Arc};

use warden_storage::{Clock, StoreClient, keys};

use crate::{
    audit::{AuditAction, AuditEntry, AuditTrail},
    config::GuardConfig,
    security_log::{SecurityEvent, SecurityEventLogger},
    types::{IdentifierKind, Severity},
};

/// Result of [`BruteForceGuard::record_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Failures in the current window, including this one.
    pub attempts: u64,
    /// Whether the identifier is locked after this failure.
    pub locked: bool,
}

#[derive(Clone)]
pub struct BruteForceGuard {
    store: StoreClient,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn SecurityEventLogger>,
    audit: AuditTrail,
    config: GuardConfig,
}

impl fmt::Debug for BruteForceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BruteForceGuard").field("config", &self.config).finish_non_exhaustive()
    }
}

impl BruteForceGuard {
    pub fn new(
        store: StoreClient,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn SecurityEventLogger>,
        audit: AuditTrail,
        config: GuardConfig,
    ) -> Self {
        Self { store, clock, logger, audit, config }
    }

    /// Whether the identifier is currently locked.
    ///
    /// When the store is unreachable the answer follows the store client's
    /// failure policy.
    #[tracing::instrument(skip(self))]
    pub async fn check_lock(&self, identifier: &str, kind: IdentifierKind) -> bool {
        self.store.exists(&keys::account_locked(kind.as_str(), identifier)).await
    }

    /// Records a failed attempt and locks the identifier when the count
    /// crosses the threshold. An existing lock is left untouched.
    #[tracing::instrument(skip(self))]
    pub async fn record_failure(&self, identifier: &str, kind: IdentifierKind) -> FailureOutcome {
        let counter_key = keys::failed_attempts(kind.as_str(), identifier);
        let attempts = self.read_count(&counter_key).await.saturating_add(1);

        self.store
            .set_with_ttl(&counter_key, attempts.to_string(), self.config.attempt_window)
            .await;

        if attempts < self.config.max_failed_attempts {
            return FailureOutcome { attempts, locked: false };
        }
        if self.check_lock(identifier, kind).await {
            return FailureOutcome { attempts, locked: true };
        }

        let locked_at = self.clock.now().to_rfc3339();
        let locked = self
            .store
            .set_with_ttl(
                &keys::account_locked(kind.as_str(), identifier),
                locked_at,
                self.config.lock_duration,
            )
            .await;

        tracing::warn!(%kind, attempts, "identifier locked after repeated failures");
        self.logger
            .log(&SecurityEvent::AccountLockout {
                identifier: identifier.to_owned(),
                kind,
                attempts,
            })
            .await;
        self.audit
            .record(
                AuditEntry::builder()
                    .user_id(identifier)
                    .action(AuditAction::AccountLocked)
                    .resource("account")
                    .resource_id(identifier)
                    .details(serde_json::json!({
                        "identifierType": kind.as_str(),
                        "attempts": attempts,
                        "lockSeconds": self.config.lock_duration.as_secs(),
                    }))
                    .severity(Severity::High)
                    .build(),
            )
            .await;

        FailureOutcome { attempts, locked }
    }

    /// Forgets the failures for an identifier. Does not lift an active lock.
    #[tracing::instrument(skip(self))]
    pub async fn clear_failures(&self, identifier: &str, kind: IdentifierKind) {
        self.store.delete(&keys::failed_attempts(kind.as_str(), identifier)).await;
    }

    /// Lifts a lock and forgets the failures, for administrative unlocks.
    #[tracing::instrument(skip(self))]
    pub async fn unlock(&self, identifier: &str, kind: IdentifierKind) -> bool {
        self.clear_failures(identifier, kind).await;
        self.store.delete(&keys::account_locked(kind.as_str(), identifier)).await
    }

    /// Failures recorded in the current window.
    pub async fn failure_count(&self, identifier: &str, kind: IdentifierKind) -> u64 {
        self.read_count(&keys::failed_attempts(kind.as_str(), identifier)).await
    }

    async fn read_count(&self, key: &str) -> u64 {
        // Missing, unreadable or garbage counters restart at zero.
        self.store.get_string(key).await.and_then(|raw| raw.trim().parse().ok()).unwrap_or(0)
    }
}
