//! Behavior of the security services while the store is unreachable.
//!
//! Reads degrade to a miss. Security flags (account locks, revoked `jti`s)
//! follow the configured failure policy. Lost writes are logged and the
//! request carries on without them; no store error reaches the caller.

#![allow(clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use warden_authn::{
    AuthConfig, IdentifierKind, LoginRequest, RequestContext, Role, TokenValidation,
    assert_auth_error, testutil::TestHarness,
};
use warden_storage::{
    FailurePolicy, MemoryBackend, StoreClientConfig,
    testutil::{OutageBackend, SlowBackend, manual_backend},
};

fn harness(policy: FailurePolicy) -> (TestHarness, OutageBackend<MemoryBackend>) {
    let (backend, clock) = manual_backend();
    let outage = OutageBackend::new(backend.clone());
    let config = AuthConfig::builder()
        .store(StoreClientConfig::builder().failure_policy(policy).build())
        .build();
    let h = TestHarness::over(Arc::new(outage.clone()), backend, clock, config);
    (h, outage)
}

fn login(password: &str) -> LoginRequest {
    LoginRequest { email: "a@x.com".to_owned(), password: password.to_owned() }
}

#[tokio::test]
async fn fail_open_treats_locks_as_absent() {
    let (h, outage) = harness(FailurePolicy::FailOpen);
    for _ in 0..5 {
        h.service.guard().record_failure("a@x.com", IdentifierKind::Email).await;
    }
    assert!(h.service.guard().check_lock("a@x.com", IdentifierKind::Email).await);

    outage.set_down(true);
    assert!(!h.service.guard().check_lock("a@x.com", IdentifierKind::Email).await);
    assert_eq!(h.service.guard().failure_count("a@x.com", IdentifierKind::Email).await, 0);

    outage.set_down(false);
    assert!(h.service.guard().check_lock("a@x.com", IdentifierKind::Email).await);
}

#[tokio::test]
async fn fail_closed_treats_every_identifier_as_locked() {
    let (h, outage) = harness(FailurePolicy::FailClosed);
    h.directory.add_user("a@x.com", "pw", Role::User);

    outage.set_down(true);
    let result = h.service.login(&login("pw"), &RequestContext::default()).await;
    assert_auth_error!(result, AccountLocked);
    assert_eq!(h.hasher.verify_calls(), 0);
}

#[tokio::test]
async fn fail_open_login_succeeds_with_an_unpersisted_session() {
    let (h, outage) = harness(FailurePolicy::FailOpen);
    h.directory.add_user("a@x.com", "pw", Role::User);

    outage.set_down(true);
    let auth = h.service.login(&login("pw"), &RequestContext::default()).await.expect("login");
    assert!(h.service.tokens().validate(&auth.access_token).await.is_valid());
    assert!(h.service.tokens().redeem_refresh_token(&auth.refresh_token).await.is_none());

    outage.set_down(false);
    assert!(h.service.session_store().get(&auth.session_id).await.is_none());
    assert!(h.backend.is_empty());

    let auth = h.service.login(&login("pw"), &RequestContext::default()).await.expect("login");
    assert!(h.service.session_store().get(&auth.session_id).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn request_deadline_bounds_every_store_call() {
    let (backend, clock) = manual_backend();
    let slow = SlowBackend::new(backend.clone(), Duration::from_millis(50));
    let h = TestHarness::over(Arc::new(slow), backend, clock, AuthConfig::default());
    h.directory.add_user("a@x.com", "pw", Role::User);

    let scoped = h.service.with_deadline(Duration::from_millis(10));
    assert_eq!(scoped.store().operation_timeout(), Duration::from_millis(10));
    assert_eq!(h.service.store().operation_timeout(), Duration::from_secs(2));

    let auth = scoped.login(&login("pw"), &RequestContext::default()).await.expect("login");
    assert!(h.service.store().metrics().timeouts > 0);
    assert!(h.service.session_store().get(&auth.session_id).await.is_none());

    let auth = h.service.login(&login("pw"), &RequestContext::default()).await.expect("login");
    assert!(h.service.session_store().get(&auth.session_id).await.is_some());
}

#[tokio::test]
async fn revocation_check_follows_policy() {
    for (policy, valid_during_outage) in
        [(FailurePolicy::FailOpen, true), (FailurePolicy::FailClosed, false)]
    {
        let (h, outage) = harness(policy);
        let pair = h.service.tokens().issue_pair("42", "a@x.com", Role::User).await.expect("issue");

        outage.set_down(true);
        let validation = h.service.tokens().validate(&pair.access_token).await;
        assert_eq!(validation.is_valid(), valid_during_outage, "{policy:?}");
        if !valid_during_outage {
            assert!(matches!(
                validation,
                TokenValidation::Invalid(warden_authn::AuthError::TokenRevoked)
            ));
        }
    }
}

#[tokio::test]
async fn refresh_is_refused_during_outage_under_both_policies() {
    for policy in [FailurePolicy::FailOpen, FailurePolicy::FailClosed] {
        let (h, outage) = harness(policy);
        let pair = h.service.tokens().issue_pair("42", "a@x.com", Role::User).await.expect("issue");

        outage.set_down(true);
        assert!(h.service.tokens().redeem_refresh_token(&pair.refresh_token).await.is_none());

        outage.set_down(false);
        assert!(h.service.tokens().redeem_refresh_token(&pair.refresh_token).await.is_some());
    }
}

#[tokio::test]
async fn detector_and_sessions_degrade_quietly() {
    let (h, outage) = harness(FailurePolicy::FailOpen);
    outage.set_down(true);

    assert!(
        !h.service
            .detector()
            .check_suspicious_activity("42", "failed_login", "10.0.0.1", serde_json::json!({}))
            .await
    );
    assert!(h.service.session_store().get("any").await.is_none());
    assert!(h.service.session_store().list("42").await.is_empty());
    assert_eq!(h.service.session_store().revoke_all("42").await, 0);
    assert!(h.service.audit_trail().query(&Default::default()).await.is_empty());

    let metrics = h.service.store().metrics();
    assert!(metrics.failures > 0);
}
