//! Persistent audit trail.
//!
//! Records who did what, to which resource, from where and how severe it was.
//! Each record is written once to `audit:{eventId}` with the configured
//! retention as TTL and mirrored to the [`SecurityEventLogger`]; records are
//! never updated. Once the retention window passes the store evicts them.
//!
//! # Queries
//!
//! [`AuditQuery`] filters by user, resource, action, minimum severity and time
//! range and returns the newest records first. The filter runs client-side
//! over a prefix scan of the `audit:` namespace, which only suits small
//! volumes; the query contract stays the same if the scan is replaced by an
//! index.
//!
//! ```
//! use std::sync::Arc;
//! use warden_authn::audit::{AuditAction, AuditEntry, AuditQuery, AuditTrail};
//! use warden_authn::{AuditConfig, Severity, TracingSecurityLogger};
//! use warden_storage::{MemoryBackend, StoreClient, SystemClock};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = StoreClient::new(Arc::new(MemoryBackend::new()));
//! let trail = AuditTrail::new(
//!     store,
//!     Arc::new(SystemClock),
//!     Arc::new(TracingSecurityLogger),
//!     AuditConfig::default(),
//! );
//!
//! trail
//!     .record(
//!         AuditEntry::builder()
//!             .user_id("42")
//!             .action(AuditAction::Login)
//!             .resource("session")
//!             .severity(Severity::Low)
//!             .build(),
//!     )
//!     .await;
//!
//! let events = trail.query(&AuditQuery::builder().user_id("42").build()).await;
//! assert_eq!(events.len(), 1);
//! # });
//! ```

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_storage::{Clock, StoreClient, keys};

use crate::{
    config::AuditConfig,
    ids,
    security_log::SecurityEventLogger,
    types::{RequestContext, Severity},
};

/// Actions this crate writes to the trail.
///
/// The stored `action` is a plain string so records written by other
/// processes can carry actions not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    LoginFailed,
    Register,
    Logout,
    LogoutAll,
    TokenRefreshed,
    AccountLocked,
    RoleChanged,
    PermissionDenied,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::LoginFailed => "login_failed",
            Self::Register => "register",
            Self::Logout => "logout",
            Self::LogoutAll => "logout_all",
            Self::TokenRefreshed => "token_refreshed",
            Self::AccountLocked => "account_locked",
            Self::RoleChanged => "role_changed",
            Self::PermissionDenied => "permission_denied",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        action.as_str().to_owned()
    }
}

/// A stored audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

/// The caller-supplied part of an audit record. The trail assigns the id and
/// timestamp.
#[derive(Debug, Clone, bon::Builder)]
pub struct AuditEntry {
    #[builder(into)]
    pub user_id: String,
    #[builder(into)]
    pub action: String,
    #[builder(into)]
    pub resource: String,
    #[builder(into)]
    pub resource_id: Option<String>,
    #[builder(default = serde_json::Value::Object(serde_json::Map::new()))]
    pub details: serde_json::Value,
    #[builder(into, default = String::from("unknown"))]
    pub ip: String,
    #[builder(into)]
    pub user_agent: Option<String>,
    #[builder(default)]
    pub severity: Severity,
}

impl AuditEntry {
    /// Copies the client address and user agent from `ctx`.
    #[must_use]
    pub fn with_context(mut self, ctx: &RequestContext) -> Self {
        self.ip.clone_from(&ctx.ip);
        self.user_agent.clone_from(&ctx.user_agent);
        self
    }
}

/// Filter for [`AuditTrail::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct AuditQuery {
    #[builder(into)]
    pub user_id: Option<String>,
    #[builder(into)]
    pub resource: Option<String>,
    #[builder(into)]
    pub action: Option<String>,
    /// Matches records at or above this severity.
    pub min_severity: Option<Severity>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
    /// Capped at the configured `max_results`.
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.user_id.as_deref().is_none_or(|u| event.user_id == u)
            && self.resource.as_deref().is_none_or(|r| event.resource == r)
            && self.action.as_deref().is_none_or(|a| event.action == a)
            && self.min_severity.is_none_or(|s| event.severity >= s)
            && self.since.is_none_or(|t| event.timestamp >= t)
            && self.until.is_none_or(|t| event.timestamp < t)
    }
}

/// Writes and queries audit records.
#[derive(Clone)]
pub struct AuditTrail {
    store: StoreClient,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn SecurityEventLogger>,
    config: AuditConfig,
}

impl fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditTrail").field("config", &self.config).finish_non_exhaustive()
    }
}

impl AuditTrail {
    pub fn new(
        store: StoreClient,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn SecurityEventLogger>,
        config: AuditConfig,
    ) -> Self {
        Self { store, clock, logger, config }
    }

    /// Persists an audit record and mirrors it to the logger.
    ///
    /// The record is mirrored even if the store write fails, so the log sink
    /// still sees it. Returns the stored record, or `None` if the write was
    /// not acknowledged.
    #[tracing::instrument(
        skip(self, entry),
        fields(action = %entry.action, user_id = %entry.user_id)
    )]
    pub async fn record(&self, entry: AuditEntry) -> Option<AuditEvent> {
        let now = self.clock.now();
        let event = AuditEvent {
            id: ids::time_ordered_id(now),
            user_id: entry.user_id,
            action: entry.action,
            resource: entry.resource,
            resource_id: entry.resource_id,
            details: entry.details,
            ip: entry.ip,
            user_agent: entry.user_agent,
            timestamp: now,
            severity: entry.severity,
        };

        let key = keys::audit(&event.id);
        let stored = self.store.set_json_with_ttl(&key, &event, self.config.retention).await;
        self.logger.log_audit(&event).await;

        if !stored {
            tracing::warn!(event_id = %event.id, "audit record not persisted");
            return None;
        }
        Some(event)
    }

    /// Fetches one record by id.
    pub async fn get(&self, event_id: &str) -> Option<AuditEvent> {
        self.store.get_json(&keys::audit(event_id)).await
    }

    /// Returns records matching `query`, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let limit = query.limit.unwrap_or(self.config.max_results).min(self.config.max_results);

        let mut events = Vec::new();
        for key in self.store.keys(keys::AUDIT_PREFIX).await {
            // Records can expire between the scan and the read.
            if let Some(event) = self.store.get_json::<AuditEvent>(&key).await
                && query.matches(&event)
            {
                events.push(event);
            }
        }

        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        events.truncate(limit);
        events
    }

    /// Records of `Critical` severity only, newest first.
    pub async fn critical_events(&self, limit: Option<usize>) -> Vec<AuditEvent> {
        let query = AuditQuery {
            min_severity: Some(Severity::Critical),
            limit,
            ..AuditQuery::default()
        };
        self.query(&query).await
    }

    /// All records for one user, newest first.
    pub async fn user_events(&self, user_id: &str, limit: Option<usize>) -> Vec<AuditEvent> {
        let query =
            AuditQuery { user_id: Some(user_id.to_owned()), limit, ..AuditQuery::default() };
        self.query(&query).await
    }
}
