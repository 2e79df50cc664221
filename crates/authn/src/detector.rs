//! Suspicious activity detection.
//!
//! Counts named activities per `(subject, activity, source)` and compares the
//! counts to a static table of [`ActivityPattern`]s. Detection is advisory:
//! it logs and reports, it never blocks the request that triggered it.

use std::{fmt, sync::Arc, time::Duration};

use warden_storage::{StoreClient, keys};

use crate::{
    config::DetectorConfig,
    security_log::{SecurityEvent, SecurityEventLogger},
    types::Severity,
};

/// One row of the pattern table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityPattern {
    /// Matches any activity label containing this string.
    pub pattern: &'static str,
    /// Count at or above which the pattern fires.
    pub threshold: u64,
    /// Window the threshold is meant for; reported with the event.
    pub time_window: Duration,
    pub severity: Severity,
}

impl ActivityPattern {
    pub fn matches(&self, activity: &str) -> bool {
        activity.contains(self.pattern)
    }
}

const MINUTE: u64 = 60;

/// Built-in patterns.
pub const ACTIVITY_PATTERNS: &[ActivityPattern] = &[
    ActivityPattern {
        pattern: "failed_login",
        threshold: 5,
        time_window: Duration::from_secs(15 * MINUTE),
        severity: Severity::Medium,
    },
    ActivityPattern {
        pattern: "password_reset",
        threshold: 3,
        time_window: Duration::from_secs(60 * MINUTE),
        severity: Severity::Medium,
    },
    ActivityPattern {
        pattern: "data_export",
        threshold: 10,
        time_window: Duration::from_secs(60 * MINUTE),
        severity: Severity::High,
    },
    ActivityPattern {
        pattern: "unauthorized_access",
        threshold: 3,
        time_window: Duration::from_secs(15 * MINUTE),
        severity: Severity::High,
    },
    ActivityPattern {
        pattern: "privilege_escalation",
        threshold: 1,
        time_window: Duration::from_secs(60 * MINUTE),
        severity: Severity::Critical,
    },
];

/// Activity label reported when the `(source, identifier)` counter fires.
pub const BRUTE_FORCE_ACTIVITY: &str = "brute_force";

#[derive(Clone)]
pub struct SuspiciousActivityDetector {
    store: StoreClient,
    logger: Arc<dyn SecurityEventLogger>,
    config: DetectorConfig,
    patterns: &'static [ActivityPattern],
}

impl fmt::Debug for SuspiciousActivityDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspiciousActivityDetector")
            .field("config", &self.config)
            .field("patterns", &self.patterns.len())
            .finish_non_exhaustive()
    }
}

impl SuspiciousActivityDetector {
    /// Creates a detector using [`ACTIVITY_PATTERNS`].
    pub fn new(
        store: StoreClient,
        logger: Arc<dyn SecurityEventLogger>,
        config: DetectorConfig,
    ) -> Self {
        Self::with_patterns(store, logger, config, ACTIVITY_PATTERNS)
    }

    pub fn with_patterns(
        store: StoreClient,
        logger: Arc<dyn SecurityEventLogger>,
        config: DetectorConfig,
        patterns: &'static [ActivityPattern],
    ) -> Self {
        Self { store, logger, config, patterns }
    }

    /// Counts one occurrence of `activity` and reports whether any matching
    /// pattern reached its threshold.
    ///
    /// Critical patterns additionally log a security violation.
    #[tracing::instrument(skip(self, details))]
    pub async fn check_suspicious_activity(
        &self,
        subject: &str,
        activity: &str,
        source: &str,
        details: serde_json::Value,
    ) -> bool {
        let count = self
            .increment(&keys::suspicious(subject, activity, source), self.config.counter_window)
            .await;

        let mut suspicious = false;
        for pattern in self.patterns.iter().filter(|p| p.matches(activity)) {
            if count < pattern.threshold {
                continue;
            }
            suspicious = true;

            tracing::warn!(
                pattern = pattern.pattern,
                count,
                threshold = pattern.threshold,
                severity = %pattern.severity,
                "suspicious activity detected"
            );
            self.logger
                .log(&SecurityEvent::SuspiciousActivity {
                    subject: subject.to_owned(),
                    activity: activity.to_owned(),
                    source: source.to_owned(),
                    pattern: pattern.pattern,
                    count,
                    threshold: pattern.threshold,
                    severity: pattern.severity,
                    details: details.clone(),
                })
                .await;

            if pattern.severity == Severity::Critical {
                self.logger
                    .log(&SecurityEvent::SecurityViolation {
                        subject: subject.to_owned(),
                        violation: pattern.pattern.to_owned(),
                        source: source.to_owned(),
                        details: serde_json::json!({
                            "activity": activity,
                            "count": count,
                            "timeWindowSeconds": pattern.time_window.as_secs(),
                            "details": details,
                        }),
                    })
                    .await;
            }
        }
        suspicious
    }

    /// Counts one attempt against `identifier` from `source` and reports
    /// whether the pair reached the brute-force threshold.
    ///
    /// Independent of the guard's per-identifier lock: this correlates by
    /// source address.
    #[tracing::instrument(skip(self))]
    pub async fn check_brute_force_pattern(&self, source: &str, identifier: &str) -> bool {
        let count = self
            .increment(&keys::brute_force(source, identifier), self.config.brute_force_window)
            .await;

        if count < self.config.brute_force_threshold {
            return false;
        }

        tracing::warn!(count, "brute-force pattern detected");
        self.logger
            .log(&SecurityEvent::SuspiciousActivity {
                subject: identifier.to_owned(),
                activity: BRUTE_FORCE_ACTIVITY.to_owned(),
                source: source.to_owned(),
                pattern: BRUTE_FORCE_ACTIVITY,
                count,
                threshold: self.config.brute_force_threshold,
                severity: Severity::High,
                details: serde_json::json!({
                    "timeWindowSeconds": self.config.brute_force_window.as_secs(),
                }),
            })
            .await;
        true
    }

    /// Read-increment-write with the TTL restarted. Not atomic across requests.
    async fn increment(&self, key: &str, ttl: Duration) -> u64 {
        let current: u64 =
            self.store.get_string(key).await.and_then(|raw| raw.trim().parse().ok()).unwrap_or(0);
        let next = current.saturating_add(1);
        self.store.set_with_ttl(key, next.to_string(), ttl).await;
        next
    }
}
