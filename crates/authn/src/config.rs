//! Configuration for the security services.
//!
//! Every section deserializes with defaults, so an empty document yields the
//! stock policy: 24h sessions, 15m access tokens, 7d refresh tokens, a lock
//! after 5 failures in 15m lasting 1h, and 90 days of audit retention.
//!
//! ```
//! use std::time::Duration;
//! use warden_authn::AuthConfig;
//!
//! let config: AuthConfig = serde_json::from_str(
//!     r#"{ "guard": { "max_failed_attempts": 3, "lock_duration": "30m" } }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.guard.max_failed_attempts, 3);
//! assert_eq!(config.guard.lock_duration, Duration::from_secs(1800));
//! assert_eq!(config.session.ttl, Duration::from_secs(24 * 3600));
//! config.validate().unwrap();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_storage::{ConfigError, StoreClientConfig};

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

fn positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::MustBePositive { field, value: format!("{value:?}") });
    }
    Ok(())
}

fn at_least_one(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::BelowMinimum { field, min: "1".into(), value: value.to_string() });
    }
    Ok(())
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    #[builder(default)]
    pub session: SessionConfig,

    #[serde(default)]
    #[builder(default)]
    pub tokens: TokenConfig,

    #[serde(default)]
    #[builder(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    #[builder(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    #[builder(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    #[builder(default)]
    pub store: StoreClientConfig,
}

impl AuthConfig {
    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("session.ttl", self.session.ttl)?;
        self.tokens.validate()?;
        self.guard.validate()?;
        self.detector.validate()?;
        self.audit.validate()?;
        self.store.validate()
    }
}

/// Server-side session lifetime.
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(with = "humantime_serde", default = "default_session_ttl")]
    #[builder(default = default_session_ttl())]
    pub ttl: Duration,
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(DAY)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl: default_session_ttl() }
    }
}

/// Token issuance settings.
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// Expected and emitted `iss` claim.
    #[serde(default = "default_issuer")]
    #[builder(into, default = default_issuer())]
    pub issuer: String,

    /// Expected and emitted `aud` claim.
    #[serde(default = "default_audience")]
    #[builder(into, default = default_audience())]
    pub audience: String,

    #[serde(with = "humantime_serde", default = "default_access_ttl")]
    #[builder(default = default_access_ttl())]
    pub access_ttl: Duration,

    #[serde(with = "humantime_serde", default = "default_refresh_ttl")]
    #[builder(default = default_refresh_ttl())]
    pub refresh_ttl: Duration,
}

fn default_issuer() -> String {
    "warden".to_owned()
}

fn default_audience() -> String {
    "warden-api".to_owned()
}

fn default_access_ttl() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_refresh_ttl() -> Duration {
    Duration::from_secs(7 * DAY)
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            audience: default_audience(),
            access_ttl: default_access_ttl(),
            refresh_ttl: default_refresh_ttl(),
        }
    }
}

impl TokenConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Invalid { field: "tokens.issuer", reason: "empty".into() });
        }
        if self.audience.is_empty() {
            return Err(ConfigError::Invalid { field: "tokens.audience", reason: "empty".into() });
        }
        positive("tokens.access_ttl", self.access_ttl)?;
        positive("tokens.refresh_ttl", self.refresh_ttl)
    }
}

/// Brute-force guard thresholds.
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    /// Failures that lock the identifier.
    #[serde(default = "default_max_failed_attempts")]
    #[builder(default = default_max_failed_attempts())]
    pub max_failed_attempts: u64,

    /// Counter TTL, restarted on every failure.
    #[serde(with = "humantime_serde", default = "default_attempt_window")]
    #[builder(default = default_attempt_window())]
    pub attempt_window: Duration,

    #[serde(with = "humantime_serde", default = "default_lock_duration")]
    #[builder(default = default_lock_duration())]
    pub lock_duration: Duration,
}

fn default_max_failed_attempts() -> u64 {
    5
}

fn default_attempt_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_lock_duration() -> Duration {
    Duration::from_secs(HOUR)
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            attempt_window: default_attempt_window(),
            lock_duration: default_lock_duration(),
        }
    }
}

impl GuardConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        at_least_one("guard.max_failed_attempts", self.max_failed_attempts)?;
        positive("guard.attempt_window", self.attempt_window)?;
        positive("guard.lock_duration", self.lock_duration)
    }
}

/// Suspicious activity detector settings.
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    /// TTL of each `(subject, activity, source)` counter.
    #[serde(with = "humantime_serde", default = "default_counter_window")]
    #[builder(default = default_counter_window())]
    pub counter_window: Duration,

    /// Attempts per `(source, identifier)` that flag a brute-force pattern.
    #[serde(default = "default_brute_force_threshold")]
    #[builder(default = default_brute_force_threshold())]
    pub brute_force_threshold: u64,

    #[serde(with = "humantime_serde", default = "default_brute_force_window")]
    #[builder(default = default_brute_force_window())]
    pub brute_force_window: Duration,
}

fn default_counter_window() -> Duration {
    Duration::from_secs(HOUR)
}

fn default_brute_force_threshold() -> u64 {
    10
}

fn default_brute_force_window() -> Duration {
    Duration::from_secs(15 * 60)
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            counter_window: default_counter_window(),
            brute_force_threshold: default_brute_force_threshold(),
            brute_force_window: default_brute_force_window(),
        }
    }
}

impl DetectorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        positive("detector.counter_window", self.counter_window)?;
        at_least_one("detector.brute_force_threshold", self.brute_force_threshold)?;
        positive("detector.brute_force_window", self.brute_force_window)
    }
}

/// Audit trail retention and query limits.
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// How long each audit record is kept before the store evicts it.
    #[serde(with = "humantime_serde", default = "default_retention")]
    #[builder(default = default_retention())]
    pub retention: Duration,

    /// Upper bound on records returned by one query.
    #[serde(default = "default_max_results")]
    #[builder(default = default_max_results())]
    pub max_results: usize,
}

fn default_retention() -> Duration {
    Duration::from_secs(90 * DAY)
}

fn default_max_results() -> usize {
    1000
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { retention: default_retention(), max_results: default_max_results() }
    }
}

impl AuditConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        positive("audit.retention", self.retention)?;
        at_least_one("audit.max_results", self.max_results as u64)
    }
}
