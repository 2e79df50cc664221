//! Small value types shared across the security services.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role carried by a user record, a session and an access token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including audit queries and role changes.
    Admin,
    /// Regular account.
    #[default]
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a security or audit event. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of identifier a brute-force counter or lock is keyed by.
///
/// Rendered as the `{type}` segment of `failed_attempts:{type}:{identifier}`
/// and `account_locked:{type}:{identifier}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Email,
    Ip,
    UserId,
}

impl IdentifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Ip => "ip",
            Self::UserId => "user_id",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a request came from, as reported by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct RequestContext {
    /// Client address. `"unknown"` when the routing layer cannot tell.
    #[builder(into, default = String::from("unknown"))]
    pub ip: String,
    #[builder(into)]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into(), user_agent: None }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Lower-cases and trims an email so lookups, counters and locks agree on
/// one spelling.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
