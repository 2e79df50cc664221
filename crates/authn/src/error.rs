//! Authentication error types.
//!
//! [`AuthError`] is the taxonomy every use case returns. Internal distinctions
//! (why a login failed, why a token was rejected) are kept in the variants so
//! they can be logged, but [`AuthError::status_code`] and
//! [`AuthError::public_message`] collapse them to the few outcomes a client is
//! allowed to see.
//!
//! There is no store-unavailable variant: the store client absorbs
//! connectivity failures and every component degrades locally, so an
//! unreachable store never reaches a caller as an error.

use std::fmt;

use thiserror::Error;

use crate::directory::DirectoryError;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Unknown user, inactive user or wrong secret at login.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The identifier crossed the failed-attempt threshold and is locked.
    #[error("Account locked")]
    AccountLocked,

    /// The user record exists but is deactivated.
    #[error("Account inactive")]
    AccountInactive,

    /// Registration conflict.
    #[error("User already exists")]
    AlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    /// Malformed token, bad signature, wrong type, issuer or audience.
    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    /// The token's `jti` is on the revocation list, or its refresh mirror is gone.
    #[error("Token revoked")]
    TokenRevoked,

    #[error("Token expired")]
    TokenExpired,

    /// The caller is authenticated but not allowed to perform the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The external user directory failed.
    #[error("User directory error: {0}")]
    Directory(
        /// The underlying directory error.
        #[source]
        DirectoryError,
    ),

    /// Token signing or credential hashing failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Creates a new `TokenInvalid` error.
    pub fn token_invalid(reason: impl Into<String>) -> Self {
        Self::TokenInvalid(reason.into())
    }

    /// Creates a new `Forbidden` error.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    /// Creates a new `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP-equivalent status for the routing layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidCredentials
            | Self::AccountInactive
            | Self::SessionNotFound
            | Self::SessionExpired
            | Self::TokenInvalid(_)
            | Self::TokenRevoked
            | Self::TokenExpired => 401,
            Self::Forbidden(_) => 403,
            Self::UserNotFound => 404,
            Self::AlreadyExists => 409,
            Self::AccountLocked => 429,
            Self::Directory(_) | Self::Internal(_) => 500,
        }
    }

    /// Message safe to return to the client.
    ///
    /// Never reveals whether an account exists or why a token was rejected.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials | Self::AccountInactive => "Invalid email or password",
            Self::AccountLocked => "Too many failed attempts. Account temporarily locked",
            Self::AlreadyExists => "User already exists",
            Self::UserNotFound => "User not found",
            Self::SessionNotFound | Self::SessionExpired => "Session not found or expired",
            Self::TokenInvalid(_) | Self::TokenRevoked | Self::TokenExpired => {
                "Invalid or expired token"
            },
            Self::Forbidden(_) => "Insufficient permissions",
            Self::Directory(_) | Self::Internal(_) => "Internal server error",
        }
    }

    /// Returns `true` for the token variants that share one external outcome.
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::TokenInvalid(_) | Self::TokenRevoked | Self::TokenExpired)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidToken => AuthError::token_invalid("Invalid JWT structure"),
            ErrorKind::InvalidSignature => AuthError::token_invalid("Invalid signature"),
            ErrorKind::InvalidIssuer => AuthError::token_invalid("Issuer validation failed"),
            ErrorKind::InvalidAudience => AuthError::token_invalid("Audience validation failed"),
            ErrorKind::InvalidAlgorithm => AuthError::token_invalid("Algorithm not supported"),
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::token_invalid(format!("Missing claim: {claim}"))
            },
            _ => AuthError::token_invalid(format!("JWT error: {err}")),
        }
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Conflict { .. } => AuthError::AlreadyExists,
            other => AuthError::Directory(other),
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Precise reason a login was rejected.
///
/// Only ever written to the security log and the audit trail. The caller sees
/// [`AuthError::AccountLocked`] or [`AuthError::InvalidCredentials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRejection {
    /// Rejected at the lock check, before any credential comparison.
    Locked,
    UnknownUser,
    Inactive,
    BadSecret,
}

impl LoginRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "account_locked",
            Self::UnknownUser => "unknown_user",
            Self::Inactive => "account_inactive",
            Self::BadSecret => "invalid_password",
        }
    }

    /// The error returned to the caller for this rejection.
    pub fn into_error(self) -> AuthError {
        match self {
            Self::Locked => AuthError::AccountLocked,
            Self::UnknownUser | Self::Inactive | Self::BadSecret => AuthError::InvalidCredentials,
        }
    }
}

impl fmt::Display for LoginRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
