//! Authentication use cases.
//!
//! [`AuthService`] sequences the guard, the directory, the hasher, sessions,
//! tokens, the detector and the audit trail into login, registration,
//! logout, refresh and the authenticated queries around them.
//!
//! # Login
//!
//! `LOCK_CHECK -> CREDENTIAL_CHECK -> SESSION_CREATE -> TOKEN_ISSUE -> AUDIT`.
//! A locked identifier is rejected before the directory or the hasher is
//! touched. Unknown user, inactive user and wrong secret all surface as
//! [`AuthError::InvalidCredentials`]; the precise reason goes only to the
//! security log and the audit trail. Unknown users are verified against a
//! decoy credential so all three cost one hash comparison. Every rejection,
//! including a locked one, records a failure with the guard and feeds the
//! detector.
//!
//! # Registration
//!
//! `UNIQUENESS_CHECK -> CREATE_USER -> SESSION_CREATE -> TOKEN_ISSUE -> AUDIT`.
//! A taken email is reported as [`AuthError::AlreadyExists`] and never
//! touches the guard.
//!
//! # Store outages
//!
//! Store failures never surface as errors. Sessions and refresh mirrors that
//! could not be written are logged and the use case completes; the lost state
//! then reads as absent. Each store call is bounded by the configured
//! deadline, or by a request-scoped one through [`AuthService::with_deadline`].

use std::{fmt, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::json;
use tokio::sync::OnceCell;
use warden_storage::{Clock, ConfigError, StorageBackend, StoreClient, SystemClock};

use crate::{
    audit::{AuditAction, AuditEntry, AuditEvent, AuditQuery, AuditTrail},
    config::AuthConfig,
    detector::SuspiciousActivityDetector,
    directory::{CredentialHasher, NewUser, UserDirectory, UserProfile, UserRecord},
    error::{AuthError, LoginRejection, Result},
    guard::BruteForceGuard,
    security_log::{SecurityEvent, SecurityEventLogger, TracingSecurityLogger},
    session::{Session, SessionStore},
    token::{SigningKeys, TokenService},
    types::{IdentifierKind, RequestContext, Role, Severity, normalize_email},
};

/// Activity label fed to the detector on every rejected login.
pub const FAILED_LOGIN_ACTIVITY: &str = "failed_login";
/// Activity label fed to the detector on every successful login.
pub const LOGIN_SUCCESS_ACTIVITY: &str = "login_success";
/// Activity label fed to the detector when a non-admin tries an admin action.
pub const PRIVILEGE_ESCALATION_ACTIVITY: &str = "privilege_escalation";

/// Hashed once per service; unknown-user logins are verified against it.
const DECOY_SECRET: &str = "warden-decoy-credential";

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    /// Defaults to [`Role::User`].
    pub role: Option<Role>,
}

/// Successful login or registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
    pub session_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct LogoutRequest {
    pub session_id: String,
    /// Revoked by `jti` when it belongs to the session's user.
    pub access_token: Option<String>,
    /// Its mirror is deleted when given.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoutOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllOutcome {
    pub success: bool,
    pub deleted_sessions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessions {
    pub active_sessions: Vec<Session>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedAccess {
    pub access_token: String,
}

/// How a request proves who it is.
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
    /// An access token from an `Authorization: Bearer` header.
    Bearer(&'a str),
    /// A session id from a cookie.
    Session(&'a str),
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    /// Set when authenticated by session.
    pub session_id: Option<String>,
    /// Access token `jti`, set when authenticated by bearer token.
    pub token_id: Option<String>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Entry point for every authentication use case.
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    store: StoreClient,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn SecurityEventLogger>,
    directory: Arc<dyn UserDirectory>,
    hasher: Arc<dyn CredentialHasher>,
    keys: Arc<SigningKeys>,
    decoy_hash: Arc<OnceCell<String>>,
    sessions: SessionStore,
    tokens: TokenService,
    guard: BruteForceGuard,
    detector: SuspiciousActivityDetector,
    audit: AuditTrail,
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService").field("config", &self.config).finish_non_exhaustive()
    }
}

#[bon::bon]
impl AuthService {
    /// Wires every component over one store client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    #[builder]
    pub fn new(
        #[builder(default)] config: AuthConfig,
        backend: Arc<dyn StorageBackend>,
        keys: Arc<SigningKeys>,
        directory: Arc<dyn UserDirectory>,
        hasher: Arc<dyn CredentialHasher>,
        #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)] clock: Arc<dyn Clock>,
        #[builder(default = Arc::new(TracingSecurityLogger) as Arc<dyn SecurityEventLogger>)]
        logger: Arc<dyn SecurityEventLogger>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let store = StoreClient::with_config(backend, config.store.clone());
        let Components { sessions, tokens, guard, detector, audit } =
            Components::wire(&config, &store, &clock, &logger, Arc::clone(&keys));

        Ok(Self {
            config,
            store,
            clock,
            logger,
            directory,
            hasher,
            keys,
            decoy_hash: Arc::default(),
            sessions,
            tokens,
            guard,
            detector,
            audit,
        })
    }
}

/// The store-backed services, all over one store client.
struct Components {
    sessions: SessionStore,
    tokens: TokenService,
    guard: BruteForceGuard,
    detector: SuspiciousActivityDetector,
    audit: AuditTrail,
}

impl Components {
    fn wire(
        config: &AuthConfig,
        store: &StoreClient,
        clock: &Arc<dyn Clock>,
        logger: &Arc<dyn SecurityEventLogger>,
        keys: Arc<SigningKeys>,
    ) -> Self {
        let audit = AuditTrail::new(
            store.clone(),
            Arc::clone(clock),
            Arc::clone(logger),
            config.audit.clone(),
        );
        let sessions = SessionStore::new(store.clone(), Arc::clone(clock), config.session.ttl);
        let tokens =
            TokenService::new(store.clone(), Arc::clone(clock), keys, config.tokens.clone());
        let guard = BruteForceGuard::new(
            store.clone(),
            Arc::clone(clock),
            Arc::clone(logger),
            audit.clone(),
            config.guard.clone(),
        );
        let detector = SuspiciousActivityDetector::new(
            store.clone(),
            Arc::clone(logger),
            config.detector.clone(),
        );
        Self { sessions, tokens, guard, detector, audit }
    }
}

impl AuthService {
    /// Handle for one request whose store calls are each bounded by
    /// `deadline` instead of the configured `store.operation_timeout`.
    ///
    /// A call that misses the deadline degrades like any other store failure.
    /// Store counters stay shared with `self`.
    #[must_use]
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        let store = self.store.with_deadline(deadline);
        let Components { sessions, tokens, guard, detector, audit } = Components::wire(
            &self.config,
            &store,
            &self.clock,
            &self.logger,
            Arc::clone(&self.keys),
        );
        Self { store, sessions, tokens, guard, detector, audit, ..self.clone() }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn guard(&self) -> &BruteForceGuard {
        &self.guard
    }

    pub fn detector(&self) -> &SuspiciousActivityDetector {
        &self.detector
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit
    }

    /// Authenticates an email and password and opens a session.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AccountLocked`] if the email is locked
    /// - [`AuthError::InvalidCredentials`] for an unknown user, an inactive user or a wrong
    ///   password
    /// - [`AuthError::Internal`] if signing the tokens failed
    /// - [`AuthError::Directory`] if the user directory failed
    #[tracing::instrument(skip_all, fields(ip = %ctx.ip))]
    pub async fn login(&self, request: &LoginRequest, ctx: &RequestContext) -> Result<AuthSession> {
        let email = normalize_email(&request.email);

        if self.guard.check_lock(&email, IdentifierKind::Email).await {
            return Err(self.reject_login(&email, None, LoginRejection::Locked, ctx).await);
        }

        let user = self.directory.find_by_email(&email).await?;
        let stored_hash = match &user {
            Some(user) => user.password_hash.as_str(),
            None => self.decoy_hash().await,
        };
        let secret_matches = self.hasher.verify(&request.password, stored_hash).await;

        let user = match user {
            None => {
                return Err(self.reject_login(&email, None, LoginRejection::UnknownUser, ctx).await);
            },
            Some(user) if !user.active => {
                let rejection = LoginRejection::Inactive;
                return Err(self.reject_login(&email, Some(&user), rejection, ctx).await);
            },
            Some(user) if !secret_matches => {
                let rejection = LoginRejection::BadSecret;
                return Err(self.reject_login(&email, Some(&user), rejection, ctx).await);
            },
            Some(user) => user,
        };

        self.guard.clear_failures(&email, IdentifierKind::Email).await;
        let auth = self.open_session(&user, ctx).await?;

        self.detector
            .check_suspicious_activity(
                &user.id,
                LOGIN_SUCCESS_ACTIVITY,
                &ctx.ip,
                json!({ "sessionId": auth.session_id }),
            )
            .await;
        self.logger
            .log(&SecurityEvent::LoginAttempt {
                email: email.clone(),
                user_id: Some(user.id.clone()),
                success: true,
                reason: None,
                ip: ctx.ip.clone(),
                user_agent: ctx.user_agent.clone(),
            })
            .await;
        self.audit
            .record(
                AuditEntry::builder()
                    .user_id(user.id.as_str())
                    .action(AuditAction::Login)
                    .resource("session")
                    .resource_id(auth.session_id.as_str())
                    .details(json!({ "email": email }))
                    .severity(Severity::Low)
                    .build()
                    .with_context(ctx),
            )
            .await;

        tracing::info!(user_id = %user.id, "login succeeded");
        Ok(auth)
    }

    /// Creates an account and opens a session for it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AlreadyExists`] if the email is taken
    /// - [`AuthError::Internal`] if hashing the password or signing the tokens failed
    /// - [`AuthError::Directory`] if the user directory failed
    #[tracing::instrument(skip_all, fields(ip = %ctx.ip))]
    pub async fn register(
        &self,
        request: &RegisterRequest,
        ctx: &RequestContext,
    ) -> Result<AuthSession> {
        let email = normalize_email(&request.email);

        if self.directory.find_by_email(&email).await?.is_some() {
            tracing::info!("registration rejected: email taken");
            return Err(AuthError::AlreadyExists);
        }

        let password_hash = self.hasher.hash(&request.password).await?;
        let user = self
            .directory
            .create_user(NewUser {
                email: email.clone(),
                name: request.name.clone(),
                role: request.role.unwrap_or_default(),
                password_hash,
            })
            .await?;

        let auth = self.open_session(&user, ctx).await?;
        self.audit
            .record(
                AuditEntry::builder()
                    .user_id(user.id.as_str())
                    .action(AuditAction::Register)
                    .resource("user")
                    .resource_id(user.id.as_str())
                    .details(json!({ "email": email, "role": user.role }))
                    .severity(Severity::Low)
                    .build()
                    .with_context(ctx),
            )
            .await;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(auth)
    }

    /// Ends one session. Unknown or expired sessions are reported, not
    /// raised, so calling this twice is safe.
    #[tracing::instrument(skip_all, fields(session_id = %request.session_id))]
    pub async fn logout(&self, request: &LogoutRequest, ctx: &RequestContext) -> LogoutOutcome {
        let Some(session) = self.sessions.revoke(&request.session_id).await else {
            return LogoutOutcome { success: false, message: "Session not found".to_owned() };
        };

        if let Some(token) = &request.access_token {
            let validation = self.tokens.validate(token).await;
            if let Some(claims) = validation.claims()
                && claims.sub == session.user_id
            {
                self.tokens.revoke(&claims.jti).await;
            }
        }
        if let Some(token) = &request.refresh_token {
            self.tokens.revoke_refresh_token(token).await;
        }

        self.logger
            .log(&SecurityEvent::SessionRevoked {
                user_id: session.user_id.clone(),
                session_id: session.session_id.clone(),
                reason: "logout",
            })
            .await;
        self.audit
            .record(
                AuditEntry::builder()
                    .user_id(session.user_id.as_str())
                    .action(AuditAction::Logout)
                    .resource("session")
                    .resource_id(session.session_id.as_str())
                    .severity(Severity::Low)
                    .build()
                    .with_context(ctx),
            )
            .await;

        LogoutOutcome { success: true, message: "Logged out successfully".to_owned() }
    }

    /// Ends every session of the caller and revokes the access token the
    /// call was made with.
    #[tracing::instrument(skip_all, fields(user_id = %principal.user_id))]
    pub async fn logout_all(
        &self,
        principal: &Principal,
        ctx: &RequestContext,
    ) -> LogoutAllOutcome {
        let deleted_sessions = self.sessions.revoke_all(&principal.user_id).await;
        if let Some(jti) = &principal.token_id {
            self.tokens.revoke(jti).await;
        }

        self.logger
            .log(&SecurityEvent::SessionRevoked {
                user_id: principal.user_id.clone(),
                session_id: "*".to_owned(),
                reason: "logout_all",
            })
            .await;
        self.audit
            .record(
                AuditEntry::builder()
                    .user_id(principal.user_id.as_str())
                    .action(AuditAction::LogoutAll)
                    .resource("session")
                    .details(json!({ "deletedSessions": deleted_sessions }))
                    .severity(Severity::Medium)
                    .build()
                    .with_context(ctx),
            )
            .await;

        LogoutAllOutcome { success: true, deleted_sessions }
    }

    /// The caller's live sessions.
    pub async fn list_sessions(&self, principal: &Principal) -> ActiveSessions {
        let active_sessions = self.sessions.active_sessions(&principal.user_id).await;
        let count = active_sessions.len();
        ActiveSessions { active_sessions, count }
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// The user is re-read so the new token carries the current email and
    /// role, and so deactivated users cannot refresh.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenInvalid`] if the refresh token is not redeemable or its user is gone or
    ///   inactive
    /// - [`AuthError::Directory`] if the user directory failed
    #[tracing::instrument(skip_all, fields(ip = %ctx.ip))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<RefreshedAccess> {
        let claims = self
            .tokens
            .redeem_refresh_token(refresh_token)
            .await
            .ok_or_else(|| AuthError::token_invalid("refresh token not redeemable"))?;

        let user = self
            .directory
            .find_by_id(&claims.sub)
            .await?
            .filter(|user| user.active)
            .ok_or_else(|| {
                AuthError::token_invalid("refresh token subject is not an active user")
            })?;

        let access_token = self.tokens.issue_access_token(&user.id, &user.email, user.role)?;

        self.logger.log(&SecurityEvent::TokenRefreshed { user_id: user.id.clone() }).await;
        self.audit
            .record(
                AuditEntry::builder()
                    .user_id(user.id.as_str())
                    .action(AuditAction::TokenRefreshed)
                    .resource("token")
                    .severity(Severity::Low)
                    .build()
                    .with_context(ctx),
            )
            .await;

        Ok(RefreshedAccess { access_token })
    }

    /// Resolves a bearer token or a session id to the caller.
    ///
    /// # Errors
    ///
    /// - a token variant of [`AuthError`] for a rejected bearer token
    /// - [`AuthError::SessionNotFound`] or [`AuthError::SessionExpired`] for a dead session
    pub async fn authenticate(&self, credential: Credential<'_>) -> Result<Principal> {
        match credential {
            Credential::Bearer(token) => {
                let claims = self.tokens.validate(token).await.into_result()?;
                let email = claims
                    .email
                    .ok_or_else(|| AuthError::token_invalid("access token has no email"))?;
                Ok(Principal {
                    user_id: claims.sub,
                    email,
                    role: claims.role.unwrap_or_default(),
                    session_id: None,
                    token_id: Some(claims.jti),
                })
            },
            Credential::Session(session_id) => {
                let session = self.sessions.lookup(session_id).await?;
                Ok(Principal {
                    user_id: session.user_id,
                    email: session.email,
                    role: session.role,
                    session_id: Some(session.session_id),
                    token_id: None,
                })
            },
        }
    }

    /// The caller's profile.
    ///
    /// # Errors
    ///
    /// Any error from [`authenticate`](Self::authenticate), or
    /// [`AuthError::UserNotFound`] if the user has since been removed.
    pub async fn me(&self, credential: Credential<'_>) -> Result<UserProfile> {
        let principal = self.authenticate(credential).await?;
        let user =
            self.directory.find_by_id(&principal.user_id).await?.ok_or(AuthError::UserNotFound)?;
        Ok(UserProfile::from(&user))
    }

    /// Changes a user's role. Admins only.
    ///
    /// A non-admin attempt is audited and reported to the detector as
    /// privilege escalation. A successful change revokes every session of
    /// the target so the new role applies from their next login.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Forbidden`] if `actor` is not an admin
    /// - [`AuthError::UserNotFound`] if the target does not exist
    /// - [`AuthError::Directory`] if the user directory failed
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, target = %target_id))]
    pub async fn change_role(
        &self,
        actor: &Principal,
        target_id: &str,
        role: Role,
        ctx: &RequestContext,
    ) -> Result<UserProfile> {
        if !actor.is_admin() {
            self.detector
                .check_suspicious_activity(
                    &actor.user_id,
                    PRIVILEGE_ESCALATION_ACTIVITY,
                    &ctx.ip,
                    json!({ "targetId": target_id, "requestedRole": role }),
                )
                .await;
            return Err(self.deny(actor, "change_role", ctx).await);
        }

        let before =
            self.directory.find_by_id(target_id).await?.ok_or(AuthError::UserNotFound)?;
        let updated =
            self.directory.update_role(target_id, role).await?.ok_or(AuthError::UserNotFound)?;

        self.logger
            .log(&SecurityEvent::PrivilegeChange {
                actor_id: actor.user_id.clone(),
                target_id: target_id.to_owned(),
                from: before.role,
                to: updated.role,
            })
            .await;
        self.audit
            .record(
                AuditEntry::builder()
                    .user_id(actor.user_id.as_str())
                    .action(AuditAction::RoleChanged)
                    .resource("user")
                    .resource_id(target_id)
                    .details(json!({ "from": before.role, "to": updated.role }))
                    .severity(Severity::Critical)
                    .build()
                    .with_context(ctx),
            )
            .await;

        if before.role != updated.role {
            self.sessions.revoke_all(target_id).await;
        }
        Ok(UserProfile::from(&updated))
    }

    /// Queries the audit trail. Admins only.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] if `actor` is not an admin.
    pub async fn audit_events(
        &self,
        actor: &Principal,
        query: &AuditQuery,
        ctx: &RequestContext,
    ) -> Result<Vec<AuditEvent>> {
        if !actor.is_admin() {
            return Err(self.deny(actor, "audit_events", ctx).await);
        }
        Ok(self.audit.query(query).await)
    }

    /// Critical audit records, newest first. Admins only.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] if `actor` is not an admin.
    pub async fn critical_events(
        &self,
        actor: &Principal,
        limit: Option<usize>,
        ctx: &RequestContext,
    ) -> Result<Vec<AuditEvent>> {
        if !actor.is_admin() {
            return Err(self.deny(actor, "critical_events", ctx).await);
        }
        Ok(self.audit.critical_events(limit).await)
    }

    /// One user's audit records. Admins, or the user themselves.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] for anyone else.
    pub async fn user_audit(
        &self,
        actor: &Principal,
        user_id: &str,
        limit: Option<usize>,
        ctx: &RequestContext,
    ) -> Result<Vec<AuditEvent>> {
        if !actor.is_admin() && actor.user_id != user_id {
            return Err(self.deny(actor, "user_audit", ctx).await);
        }
        Ok(self.audit.user_events(user_id, limit).await)
    }

    /// Hash of [`DECOY_SECRET`] in the hasher's format, computed on first use.
    async fn decoy_hash(&self) -> &str {
        self.decoy_hash
            .get_or_init(|| async {
                self.hasher.hash(DECOY_SECRET).await.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "decoy credential could not be hashed");
                    String::new()
                })
            })
            .await
    }

    /// Session and token pair for a verified user. The session is revoked
    /// again if the tokens cannot be issued.
    async fn open_session(&self, user: &UserRecord, ctx: &RequestContext) -> Result<AuthSession> {
        let session = self.sessions.create(&user.id, &user.email, user.role).await;

        let pair = match self.tokens.issue_pair(&user.id, &user.email, user.role).await {
            Ok(pair) => pair,
            Err(err) => {
                self.sessions.revoke(&session.session_id).await;
                return Err(err);
            },
        };

        self.logger
            .log(&SecurityEvent::SessionCreated {
                user_id: user.id.clone(),
                session_id: session.session_id.clone(),
                ip: ctx.ip.clone(),
            })
            .await;

        Ok(AuthSession {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: UserProfile::from(user),
            session_id: session.session_id,
        })
    }

    /// Records a rejected login everywhere it must be seen and returns the
    /// error for the caller.
    async fn reject_login(
        &self,
        email: &str,
        user: Option<&UserRecord>,
        reason: LoginRejection,
        ctx: &RequestContext,
    ) -> AuthError {
        let outcome = self.guard.record_failure(email, IdentifierKind::Email).await;
        self.detector.check_brute_force_pattern(&ctx.ip, email).await;
        self.detector
            .check_suspicious_activity(
                email,
                FAILED_LOGIN_ACTIVITY,
                &ctx.ip,
                json!({ "reason": reason.as_str() }),
            )
            .await;

        let user_id = user.map(|u| u.id.clone());
        self.logger
            .log(&SecurityEvent::LoginAttempt {
                email: email.to_owned(),
                user_id: user_id.clone(),
                success: false,
                reason: Some(reason),
                ip: ctx.ip.clone(),
                user_agent: ctx.user_agent.clone(),
            })
            .await;
        self.audit
            .record(
                AuditEntry::builder()
                    .user_id(user_id.unwrap_or_else(|| email.to_owned()))
                    .action(AuditAction::LoginFailed)
                    .resource("session")
                    .details(json!({
                        "email": email,
                        "reason": reason.as_str(),
                        "attempts": outcome.attempts,
                    }))
                    .severity(Severity::Medium)
                    .build()
                    .with_context(ctx),
            )
            .await;

        tracing::info!(%reason, attempts = outcome.attempts, "login rejected");
        reason.into_error()
    }

    /// Audits a refused admin action and returns the error for the caller.
    async fn deny(&self, actor: &Principal, action: &str, ctx: &RequestContext) -> AuthError {
        tracing::warn!(actor = %actor.user_id, action, "permission denied");
        self.audit
            .record(
                AuditEntry::builder()
                    .user_id(actor.user_id.as_str())
                    .action(AuditAction::PermissionDenied)
                    .resource("security")
                    .details(json!({ "action": action, "role": actor.role }))
                    .severity(Severity::High)
                    .build()
                    .with_context(ctx),
            )
            .await;
        AuthError::forbidden(format!("{action} requires the admin role"))
    }
}
