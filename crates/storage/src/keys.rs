//! Key-space shared with every other reader and writer of the store.
//!
//! These layouts are an interop contract: other processes read and write the
//! same keys, so the formats here must not change.
//!
//! | Key | Record |
//! |-----|--------|
//! | `session:{sessionId}` | session record (JSON) |
//! | `user_sessions:{userId}` | JSON array of the user's session ids |
//! | `failed_attempts:{type}:{identifier}` | decimal failure count |
//! | `account_locked:{type}:{identifier}` | lock flag |
//! | `refresh_token:{token}` | refresh-token redemption record (JSON) |
//! | `revoked_token:{jti}` | revocation flag |
//! | `audit:{eventId}` | audit event (JSON) |
//! | `suspicious:{subject}:{activity}:{source}` | decimal activity count |
//! | `brute_force:{source}:{identifier}` | decimal attempt count |

#![warn(missing_docs)]

/// Prefix of every session record.
pub const SESSION_PREFIX: &str = "session:";
/// Prefix of every audit record.
pub const AUDIT_PREFIX: &str = "audit:";

/// Session record for one session id.
///
/// ```
/// use warden_storage::keys;
///
/// assert_eq!(keys::session("18f2a-x9"), "session:18f2a-x9");
/// assert!(keys::session("18f2a-x9").starts_with(keys::SESSION_PREFIX));
/// ```
pub fn session(session_id: &str) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}

/// Index of a user's session ids. Not under [`SESSION_PREFIX`].
pub fn user_sessions(user_id: &str) -> String {
    format!("user_sessions:{user_id}")
}

/// Failure counter for an identifier of the given kind (`email`, `ip`).
///
/// ```
/// use warden_storage::keys;
///
/// assert_eq!(keys::failed_attempts("email", "a@x.com"), "failed_attempts:email:a@x.com");
/// ```
pub fn failed_attempts(kind: &str, identifier: &str) -> String {
    format!("failed_attempts:{kind}:{identifier}")
}

/// Lock flag for an identifier; present while the lock holds.
pub fn account_locked(kind: &str, identifier: &str) -> String {
    format!("account_locked:{kind}:{identifier}")
}

/// Redemption record of a refresh token, keyed by the full token string.
pub fn refresh_token(token: &str) -> String {
    format!("refresh_token:{token}")
}

/// Revocation flag for an access token's `jti`.
pub fn revoked_token(jti: &str) -> String {
    format!("revoked_token:{jti}")
}

/// Audit record for one event id.
pub fn audit(event_id: &str) -> String {
    format!("{AUDIT_PREFIX}{event_id}")
}

/// Activity counter of `subject` doing `activity` from `source`.
///
/// ```
/// use warden_storage::keys;
///
/// assert_eq!(
///     keys::suspicious("42", "failed_login", "10.0.0.1"),
///     "suspicious:42:failed_login:10.0.0.1"
/// );
/// ```
pub fn suspicious(subject: &str, activity: &str, source: &str) -> String {
    format!("suspicious:{subject}:{activity}:{source}")
}

/// Attempt counter of one source against one identifier.
pub fn brute_force(source: &str, identifier: &str) -> String {
    format!("brute_force:{source}:{identifier}")
}
