//! External collaborators: the user directory and the credential hasher.
//!
//! User records live in the relational store owned by the rest of the
//! application. This crate only needs to look users up, create them at
//! registration and change their role, so it depends on the narrow
//! [`UserDirectory`] trait. Password hashing is likewise a black box behind
//! [`CredentialHasher`].

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::{error::AuthError, types::Role};

/// A user as stored by the directory, including the credential hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
    pub password_hash: String,
}

/// The public view of a user returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// Fields needed to create a user at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: String,
}

/// Errors reported by a [`UserDirectory`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DirectoryError {
    /// A user with this email already exists.
    #[error("User already exists: {email}")]
    Conflict {
        /// The conflicting email.
        email: String,
    },

    /// The directory could not serve the request.
    #[error("Directory backend failure: {0}")]
    Backend(String),
}

impl DirectoryError {
    /// Creates a new `Backend` error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Lookup and mutation of user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user by normalized (trimmed, lower-case) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, DirectoryError>;

    /// Creates a user, failing with [`DirectoryError::Conflict`] if the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, DirectoryError>;

    /// Changes a user's role. Returns `None` if the user does not exist.
    async fn update_role(&self, id: &str, role: Role) -> Result<Option<UserRecord>, DirectoryError>;
}

/// Verifies secrets against stored credentials and computes new ones.
#[async_trait]
pub trait CredentialHasher: Send + Sync {
    /// Returns whether `secret` matches `stored`.
    async fn verify(&self, secret: &str, stored: &str) -> bool;

    /// Computes the credential to store for `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if the hashing primitive fails.
    async fn hash(&self, secret: &str) -> Result<String, AuthError>;
}
