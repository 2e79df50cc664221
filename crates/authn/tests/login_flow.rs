//! End-to-end tests of the authentication use cases over an in-memory store
//! with a manually driven clock.

#![allow(clippy::expect_used, clippy::panic)]

use std::time::Duration;

use warden_authn::{
    AuthError, Credential, LoginRequest, LogoutRequest, Principal, RegisterRequest,
    RequestContext, Role, SecurityEvent, Severity, assert_auth_error, testutil::TestHarness,
};
use warden_storage::{Clock, StorageBackend};

const PASSWORD: &str = "correct horse";

fn ctx() -> RequestContext {
    RequestContext::builder().ip("10.0.0.1").user_agent("test-agent").build()
}

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest { email: email.to_owned(), password: password.to_owned() }
}

async fn principal(h: &TestHarness, session_id: &str) -> Principal {
    h.service.authenticate(Credential::Session(session_id)).await.expect("live session")
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_returns_a_resolvable_session() {
    let h = TestHarness::new();
    let user = h.directory.add_user("a@x.com", PASSWORD, Role::User);

    let auth = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");

    let session = h.service.session_store().get(&auth.session_id).await.expect("session");
    assert_eq!(session.user_id, user.id);
    assert!(session.expires_at > h.clock.now());
    assert_eq!(auth.user.id, user.id);

    let claims =
        h.service.tokens().validate(&auth.access_token).await.into_result().expect("valid");
    assert_eq!(claims.sub, user.id);

    assert_eq!(h.logger.count("login_success"), 1);
    assert_eq!(h.logger.count("session_created"), 1);
    let audits = h.service.audit_trail().user_events(&user.id, None).await;
    assert!(audits.iter().any(|e| e.action == "login" && e.ip == "10.0.0.1"));
}

#[tokio::test]
async fn login_normalizes_email() {
    let h = TestHarness::new();
    h.directory.add_user("a@x.com", PASSWORD, Role::User);

    let auth = h.service.login(&login_request("  A@X.com ", PASSWORD), &ctx()).await;
    assert!(auth.is_ok(), "got {auth:?}");
}

#[tokio::test]
async fn rejections_look_identical_to_the_caller() {
    let h = TestHarness::new();
    let inactive = h.directory.add_user("off@x.com", PASSWORD, Role::User);
    h.directory.set_active(&inactive.id, false);
    h.directory.add_user("a@x.com", PASSWORD, Role::User);

    let unknown = h.service.login(&login_request("ghost@x.com", PASSWORD), &ctx()).await;
    let disabled = h.service.login(&login_request("off@x.com", PASSWORD), &ctx()).await;
    let wrong = h.service.login(&login_request("a@x.com", "nope"), &ctx()).await;

    for result in [&unknown, &disabled, &wrong] {
        let err = result.as_ref().expect_err("rejected");
        assert!(matches!(err, AuthError::InvalidCredentials), "got {err:?}");
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.public_message(), "Invalid email or password");
    }

    // The precise reasons are only in the log.
    let reasons: Vec<&str> = h
        .logger
        .events()
        .iter()
        .filter_map(|e| match e {
            SecurityEvent::LoginAttempt { success: false, reason: Some(r), .. } => Some(r.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, ["unknown_user", "account_inactive", "invalid_password"]);
}

#[tokio::test]
async fn every_rejection_records_a_failure_and_feeds_the_detector() {
    let h = TestHarness::new();

    let _ = h.service.login(&login_request("ghost@x.com", PASSWORD), &ctx()).await;

    assert!(h.backend.exists("failed_attempts:email:ghost@x.com").await.expect("exists"));
    assert!(h.backend.exists("brute_force:10.0.0.1:ghost@x.com").await.expect("exists"));
    let suspicious = "suspicious:ghost@x.com:failed_login:10.0.0.1";
    assert!(h.backend.exists(suspicious).await.expect("exists"));
}

#[tokio::test]
async fn lockout_after_five_failures_then_recovery() {
    let h = TestHarness::new();
    h.directory.add_user("a@x.com", PASSWORD, Role::User);

    for _ in 0..5 {
        let result = h.service.login(&login_request("a@x.com", "wrong"), &ctx()).await;
        assert_auth_error!(result, InvalidCredentials);
    }
    assert!(h.service.guard().check_lock("a@x.com", warden_authn::IdentifierKind::Email).await);
    assert_eq!(h.hasher.verify_calls(), 5);

    // The sixth attempt is refused at the lock check even with the right
    // password, and never reaches the hasher.
    let result = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await;
    assert_auth_error!(result, AccountLocked);
    assert_eq!(result.as_ref().map_err(AuthError::status_code).err(), Some(429));
    assert_eq!(h.hasher.verify_calls(), 5);
    assert_eq!(h.logger.count("account_lockout"), 1);

    h.clock.advance(Duration::from_secs(3600));

    let result = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await;
    assert!(result.is_ok(), "got {result:?}");
    assert_eq!(h.hasher.verify_calls(), 6);
}

#[tokio::test]
async fn attempts_while_locked_do_not_push_back_the_unlock() {
    let h = TestHarness::new();
    h.directory.add_user("a@x.com", PASSWORD, Role::User);

    for _ in 0..5 {
        let _ = h.service.login(&login_request("a@x.com", "wrong"), &ctx()).await;
    }

    h.clock.advance(Duration::from_secs(10 * 60));
    let result = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await;
    assert_auth_error!(result, AccountLocked);

    // One hour after the lock was taken, not after the last attempt.
    h.clock.advance(Duration::from_secs(50 * 60));
    let result = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await;
    assert!(result.is_ok(), "got {result:?}");
    assert_eq!(h.logger.count("account_lockout"), 1);
}

#[tokio::test]
async fn every_unlocked_rejection_runs_the_password_check() {
    let h = TestHarness::new();
    let inactive = h.directory.add_user("off@x.com", PASSWORD, Role::User);
    h.directory.set_active(&inactive.id, false);
    h.directory.add_user("a@x.com", PASSWORD, Role::User);

    let _ = h.service.login(&login_request("ghost@x.com", PASSWORD), &ctx()).await;
    assert_eq!(h.hasher.verify_calls(), 1);

    let _ = h.service.login(&login_request("off@x.com", PASSWORD), &ctx()).await;
    assert_eq!(h.hasher.verify_calls(), 2);

    let _ = h.service.login(&login_request("a@x.com", "nope"), &ctx()).await;
    assert_eq!(h.hasher.verify_calls(), 3);

    // A decoy password never opens an account that does not exist.
    let decoy = login_request("ghost@x.com", "warden-decoy-credential");
    let result = h.service.login(&decoy, &ctx()).await;
    assert_auth_error!(result, InvalidCredentials);
    assert_eq!(h.hasher.verify_calls(), 4);
}

#[tokio::test]
async fn success_clears_the_failure_counter() {
    let h = TestHarness::new();
    h.directory.add_user("a@x.com", PASSWORD, Role::User);

    for _ in 0..4 {
        let _ = h.service.login(&login_request("a@x.com", "wrong"), &ctx()).await;
    }
    h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");

    for _ in 0..4 {
        let _ = h.service.login(&login_request("a@x.com", "wrong"), &ctx()).await;
    }
    let result = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await;
    assert!(result.is_ok(), "counter should have restarted, got {result:?}");
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_owned(),
        password: PASSWORD.to_owned(),
        name: "Alice".to_owned(),
        role: None,
    }
}

#[tokio::test]
async fn register_opens_a_session_and_allows_login() {
    let h = TestHarness::new();

    let auth = h.service.register(&register_request("new@x.com"), &ctx()).await.expect("register");
    assert_eq!(auth.user.role, Role::User);
    assert_eq!(auth.user.name, "Alice");
    assert!(h.service.session_store().get(&auth.session_id).await.is_some());

    let audits = h.service.audit_trail().user_events(&auth.user.id, None).await;
    assert!(audits.iter().any(|e| e.action == "register"));

    h.service.login(&login_request("new@x.com", PASSWORD), &ctx()).await.expect("login");
}

#[tokio::test]
async fn duplicate_registration_is_a_conflict_without_guard_state() {
    let h = TestHarness::new();
    h.directory.add_user("a@x.com", PASSWORD, Role::User);

    let result = h.service.register(&register_request("A@x.com"), &ctx()).await;
    assert_auth_error!(result, AlreadyExists);
    assert_eq!(result.as_ref().map_err(AuthError::status_code).err(), Some(409));

    assert!(!h.backend.exists("failed_attempts:email:a@x.com").await.expect("exists"));
    assert!(h.backend.keys("session:").await.expect("keys").is_empty());
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logout_is_idempotent() {
    let h = TestHarness::new();
    h.directory.add_user("a@x.com", PASSWORD, Role::User);
    let auth = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");

    let request = LogoutRequest { session_id: auth.session_id.clone(), ..LogoutRequest::default() };
    let first = h.service.logout(&request, &ctx()).await;
    assert!(first.success);

    let second = h.service.logout(&request, &ctx()).await;
    assert!(!second.success);
    assert_eq!(second.message, "Session not found");

    assert!(h.service.session_store().get(&auth.session_id).await.is_none());
    assert_eq!(h.logger.count("session_revoked"), 1);
}

#[tokio::test]
async fn logout_revokes_the_presented_tokens() {
    let h = TestHarness::new();
    h.directory.add_user("a@x.com", PASSWORD, Role::User);
    let auth = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");

    let request = LogoutRequest {
        session_id: auth.session_id.clone(),
        access_token: Some(auth.access_token.clone()),
        refresh_token: Some(auth.refresh_token.clone()),
    };
    assert!(h.service.logout(&request, &ctx()).await.success);

    let bearer = h.service.authenticate(Credential::Bearer(&auth.access_token)).await;
    assert_auth_error!(bearer, TokenRevoked);

    let refreshed = h.service.refresh(&auth.refresh_token, &ctx()).await;
    assert_auth_error!(refreshed, TokenInvalid);
}

#[tokio::test]
async fn logout_all_empties_the_session_list() {
    let h = TestHarness::new();
    h.directory.add_user("a@x.com", PASSWORD, Role::User);
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(
            h.service
                .login(&login_request("a@x.com", PASSWORD), &ctx())
                .await
                .expect("login")
                .session_id,
        );
    }

    let me = principal(&h, &ids[0]).await;
    let listed = h.service.list_sessions(&me).await;
    assert_eq!(listed.count, 3);

    let outcome = h.service.logout_all(&me, &ctx()).await;
    assert!(outcome.success);
    assert_eq!(outcome.deleted_sessions, 3);
    assert!(h.service.session_store().list(&me.user_id).await.is_empty());

    let again = h.service.authenticate(Credential::Session(&ids[1])).await;
    assert_auth_error!(again, SessionNotFound);
}

// ---------------------------------------------------------------------------
// Refresh and authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_issues_a_new_access_token_with_current_role() {
    let h = TestHarness::new();
    let user = h.directory.add_user("a@x.com", PASSWORD, Role::User);
    let auth = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");

    h.clock.advance(Duration::from_secs(20 * 60));
    assert!(!h.service.tokens().validate(&auth.access_token).await.is_valid());

    let refreshed = h.service.refresh(&auth.refresh_token, &ctx()).await.expect("refresh");
    let me = h.service.authenticate(Credential::Bearer(&refreshed.access_token)).await.expect("me");
    assert_eq!(me.user_id, user.id);
    assert_eq!(me.role, Role::User);
    assert_eq!(h.logger.count("token_refreshed"), 1);
}

#[tokio::test]
async fn deactivated_users_cannot_refresh() {
    let h = TestHarness::new();
    let user = h.directory.add_user("a@x.com", PASSWORD, Role::User);
    let auth = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");

    h.directory.set_active(&user.id, false);
    let result = h.service.refresh(&auth.refresh_token, &ctx()).await;
    assert_auth_error!(result, TokenInvalid);
    assert_eq!(
        result.as_ref().map_err(AuthError::public_message).err(),
        Some("Invalid or expired token")
    );
}

#[tokio::test]
async fn me_resolves_bearer_and_session() {
    let h = TestHarness::new();
    let user = h.directory.add_user("a@x.com", PASSWORD, Role::Admin);
    let auth = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");

    let by_token = h.service.me(Credential::Bearer(&auth.access_token)).await.expect("bearer");
    let by_session = h.service.me(Credential::Session(&auth.session_id)).await.expect("session");
    assert_eq!(by_token, by_session);
    assert_eq!(by_token.id, user.id);
    assert_eq!(by_token.role, Role::Admin);

    h.directory.remove(&user.id);
    let gone = h.service.me(Credential::Session(&auth.session_id)).await;
    assert_auth_error!(gone, UserNotFound);
}

#[tokio::test]
async fn expired_session_is_rejected() {
    let h = TestHarness::new();
    h.directory.add_user("a@x.com", PASSWORD, Role::User);
    let auth = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");

    h.clock.advance(Duration::from_secs(24 * 3600));
    let result = h.service.authenticate(Credential::Session(&auth.session_id)).await;
    assert!(
        matches!(result, Err(AuthError::SessionNotFound | AuthError::SessionExpired)),
        "got {result:?}"
    );
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_admin_role_change_is_refused_and_flagged() {
    let h = TestHarness::new();
    let user = h.directory.add_user("a@x.com", PASSWORD, Role::User);
    let auth = h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");
    let me = principal(&h, &auth.session_id).await;

    let result = h.service.change_role(&me, &user.id, Role::Admin, &ctx()).await;
    assert_auth_error!(result, Forbidden);
    assert_eq!(h.directory.user(&user.id).expect("user").role, Role::User);

    assert_eq!(h.logger.count("security_violation"), 1);
    let audits = h.service.audit_trail().user_events(&user.id, None).await;
    assert!(audits.iter().any(|e| e.action == "permission_denied" && e.severity == Severity::High));
}

#[tokio::test]
async fn admin_role_change_is_critical_and_revokes_target_sessions() {
    let h = TestHarness::new();
    h.directory.add_user("root@x.com", PASSWORD, Role::Admin);
    let target = h.directory.add_user("a@x.com", PASSWORD, Role::User);

    let admin_auth =
        h.service.login(&login_request("root@x.com", PASSWORD), &ctx()).await.expect("login");
    let target_auth =
        h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");
    let admin = principal(&h, &admin_auth.session_id).await;

    let updated = h.service.change_role(&admin, &target.id, Role::Admin, &ctx()).await.expect("ok");
    assert_eq!(updated.role, Role::Admin);
    assert!(h.service.session_store().get(&target_auth.session_id).await.is_none());
    assert_eq!(h.logger.count("privilege_change"), 1);

    let critical = h.service.critical_events(&admin, None, &ctx()).await.expect("admin");
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].action, "role_changed");

    let missing = h.service.change_role(&admin, "999", Role::User, &ctx()).await;
    assert_auth_error!(missing, UserNotFound);
}

#[tokio::test]
async fn audit_queries_are_admin_or_self() {
    let h = TestHarness::new();
    h.directory.add_user("root@x.com", PASSWORD, Role::Admin);
    let user = h.directory.add_user("a@x.com", PASSWORD, Role::User);
    let other = h.directory.add_user("b@x.com", PASSWORD, Role::User);

    let admin_auth =
        h.service.login(&login_request("root@x.com", PASSWORD), &ctx()).await.expect("login");
    let user_auth =
        h.service.login(&login_request("a@x.com", PASSWORD), &ctx()).await.expect("login");
    let admin = principal(&h, &admin_auth.session_id).await;
    let me = principal(&h, &user_auth.session_id).await;

    let own = h.service.user_audit(&me, &user.id, None, &ctx()).await.expect("self");
    assert!(!own.is_empty());
    assert!(own.iter().all(|e| e.user_id == user.id));

    let theirs = h.service.user_audit(&me, &other.id, None, &ctx()).await;
    assert_auth_error!(theirs, Forbidden);
    let all = h.service.audit_events(&me, &Default::default(), &ctx()).await;
    assert_auth_error!(all, Forbidden);

    let all = h.service.audit_events(&admin, &Default::default(), &ctx()).await.expect("admin");
    assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    assert!(h.service.user_audit(&admin, &other.id, None, &ctx()).await.is_ok());
}
