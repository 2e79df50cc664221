//! Server-side sessions.
//!
//! Each session lives under `session:{id}` as a JSON record whose store TTL
//! equals the session lifetime. `user_sessions:{userId}` holds a JSON array of
//! the user's session ids and is rewritten with the same TTL on every change.
//!
//! The per-session key is authoritative. The index is advisory: it drives
//! [`SessionStore::list`] and [`SessionStore::revoke_all`], may briefly hold
//! ids of sessions that are already gone, and is pruned as it is read.
//!
//! Expiry is checked against `expires_at` on every read, so a session is dead
//! the moment its lifetime passes even if the store has not reaped it yet.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_storage::{Clock, StoreClient, add_duration, keys};

use crate::{
    error::{AuthError, Result},
    ids,
    types::Role,
};

/// Attempts at getting a new id into the user index when a concurrent
/// writer overwrote it.
const INDEX_APPEND_ATTEMPTS: usize = 3;

/// A server-side session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session's lifetime has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone)]
pub struct SessionStore {
    store: StoreClient,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(store: StoreClient, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Session lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Creates a session and adds it to the user's index.
    ///
    /// Store failures are logged and absorbed: the session is returned even
    /// if it was not persisted, in which case later lookups miss it.
    #[tracing::instrument(skip(self, email))]
    pub async fn create(&self, user_id: &str, email: &str, role: Role) -> Session {
        let now = self.clock.now();
        let session = Session {
            session_id: ids::time_ordered_id(now),
            user_id: user_id.to_owned(),
            email: email.to_owned(),
            role,
            created_at: now,
            expires_at: add_duration(now, self.ttl),
        };

        let key = keys::session(&session.session_id);
        if !self.store.set_json_with_ttl(&key, &session, self.ttl).await {
            tracing::warn!(session_id = %session.session_id, "session record not persisted");
            return session;
        }

        self.append_to_index(user_id, &session.session_id).await;
        tracing::debug!(session_id = %session.session_id, "session created");
        session
    }

    /// Looks up a live session.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.lookup(session_id).await.ok()
    }

    /// Like [`get`](Self::get), but says why there is no live session.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionNotFound`] if there is no record (or the store is unreachable)
    /// - [`AuthError::SessionExpired`] if the record outlived `expires_at`
    #[tracing::instrument(skip(self))]
    pub async fn lookup(&self, session_id: &str) -> Result<Session> {
        let session = self.load(session_id).await.ok_or(AuthError::SessionNotFound)?;
        if session.is_expired_at(self.clock.now()) {
            return Err(AuthError::SessionExpired);
        }
        Ok(session)
    }

    /// Extends a live session by a full lifetime from now.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self, session_id: &str) -> Option<Session> {
        let mut session = self.get(session_id).await?;
        session.expires_at = add_duration(self.clock.now(), self.ttl);

        if !self.store.set_json_with_ttl(&keys::session(session_id), &session, self.ttl).await {
            tracing::warn!("session refresh not persisted");
            return None;
        }

        // Keep the index alive at least as long as the session.
        let index = self.read_index(&session.user_id).await;
        if !index.is_empty() {
            self.write_index(&session.user_id, &index).await;
        }
        Some(session)
    }

    /// Deletes a session and removes it from its user's index.
    ///
    /// Returns the revoked session, or `None` if there was no live session
    /// with that id. A logically expired record is still cleaned up.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, session_id: &str) -> Option<Session> {
        let session = self.load(session_id).await?;
        let deleted = self.store.delete(&keys::session(session_id)).await;

        let mut index = self.read_index(&session.user_id).await;
        let before = index.len();
        index.retain(|id| id != session_id);
        if index.len() != before {
            self.write_index(&session.user_id, &index).await;
        }

        if !deleted || session.is_expired_at(self.clock.now()) {
            return None;
        }
        Some(session)
    }

    /// Deletes every session in the user's index and the index itself.
    ///
    /// Returns how many session records were actually deleted. Deletes are
    /// independent; one failing does not stop or undo the others.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: &str) -> u64 {
        let index = self.read_index(user_id).await;

        let mut deleted = 0;
        for session_id in &index {
            if self.store.delete(&keys::session(session_id)).await {
                deleted += 1;
            }
        }
        self.store.delete(&keys::user_sessions(user_id)).await;

        tracing::debug!(deleted, indexed = index.len(), "sessions revoked");
        deleted
    }

    /// Ids of the user's live sessions, oldest first.
    ///
    /// Dead entries found on the way are deleted and dropped from the index.
    pub async fn list(&self, user_id: &str) -> Vec<String> {
        self.active_sessions(user_id).await.into_iter().map(|s| s.session_id).collect()
    }

    /// The user's live sessions, oldest first, pruning dead entries like
    /// [`list`](Self::list).
    #[tracing::instrument(skip(self))]
    pub async fn active_sessions(&self, user_id: &str) -> Vec<Session> {
        let index = self.read_index(user_id).await;
        if index.is_empty() {
            return Vec::new();
        }

        let now = self.clock.now();
        let mut live = Vec::with_capacity(index.len());
        let mut pruned = 0usize;
        for session_id in &index {
            match self.load(session_id).await {
                Some(session) if !session.is_expired_at(now) && session.user_id == user_id => {
                    live.push(session);
                },
                Some(session) if session.user_id != user_id => pruned += 1,
                other => {
                    if other.is_some() {
                        self.store.delete(&keys::session(session_id)).await;
                    }
                    pruned += 1;
                },
            }
        }

        if pruned > 0 {
            tracing::debug!(pruned, "pruned dead session index entries");
            let ids: Vec<String> = live.iter().map(|s| s.session_id.clone()).collect();
            self.write_index(user_id, &ids).await;
        }
        live
    }

    async fn load(&self, session_id: &str) -> Option<Session> {
        self.store.get_json(&keys::session(session_id)).await
    }

    async fn read_index(&self, user_id: &str) -> Vec<String> {
        self.store.get_json(&keys::user_sessions(user_id)).await.unwrap_or_default()
    }

    /// Rewrites the index, or deletes it when empty.
    async fn write_index(&self, user_id: &str, ids: &[String]) -> bool {
        let key = keys::user_sessions(user_id);
        if ids.is_empty() {
            return self.store.delete(&key).await;
        }
        self.store.set_json_with_ttl(&key, ids, self.ttl).await
    }

    /// Read-append-write, re-checked so a concurrent create that overwrote
    /// the index does not silently drop this id.
    async fn append_to_index(&self, user_id: &str, session_id: &str) {
        for _ in 0..INDEX_APPEND_ATTEMPTS {
            let mut index = self.read_index(user_id).await;
            if !index.iter().any(|id| id == session_id) {
                index.push(session_id.to_owned());
                if !self.write_index(user_id, &index).await {
                    tracing::warn!("session index write failed");
                    return;
                }
            }

            if self.read_index(user_id).await.iter().any(|id| id == session_id) {
                return;
            }
        }
        tracing::warn!("session index append lost to concurrent writers");
    }
}
