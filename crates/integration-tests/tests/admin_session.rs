//! Integration tests for admin sign-in and session bookkeeping.
//!
//! Sessions are persisted to a state file, so these tests also cover a
//! second process picking up (or expiring) the session.
//!
//! Run with: cargo test -p prayerline-integration-tests --test `admin_session`

use std::path::Path;
use std::sync::Arc;

use axum::http::Method;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use prayerline_client::auth::{ActivityEvent, BlockedCheck, InactivityOutcome};
use prayerline_client::fake::ManualClock;
use prayerline_client::store::keys;
use prayerline_client::{AdminAuth, AuthError, FileStore, SessionStore, SupabaseClient};
use prayerline_integration_tests::{Reply, TestServer};
use serde_json::json;

const SETTINGS: &str = "/rest/v1/admin_settings";
const SUBSCRIBERS: &str = "/rest/v1/email_subscribers";
const SEND_CODE: &str = "/functions/v1/send-verification-code";
const VERIFY_CODE: &str = "/functions/v1/verify-code";
const ADMIN_EMAIL: &str = "admin@church.org";

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
        .single()
        .expect("valid date")
}

/// Routes for an admin account with a 30 minute timeout.
fn script_admin(server: &TestServer) {
    server.on(
        Method::GET,
        SETTINGS,
        Reply::json(json!([{"inactivity_timeout_minutes": 30, "require_site_login": false}])),
    );
    server.on(
        Method::GET,
        SUBSCRIBERS,
        Reply::json(json!([{"email": ADMIN_EMAIL, "is_blocked": false}])),
    );
    server.on(Method::POST, SEND_CODE, Reply::json(json!({"codeId": "code-1"})));
    server.on(Method::POST, VERIFY_CODE, Reply::json(json!({"success": true})));
}

fn open_auth(
    server: &TestServer,
    path: &Path,
    clock: Arc<ManualClock>,
) -> (AdminAuth<SupabaseClient>, Arc<dyn SessionStore>) {
    let store: Arc<dyn SessionStore> = Arc::new(FileStore::open(path).expect("open store"));
    let auth = AdminAuth::new(Arc::new(server.client()), store.clone(), clock);
    (auth, store)
}

async fn sign_in(auth: &AdminAuth<SupabaseClient>) {
    auth.send_mfa_code("Admin@Church.org")
        .await
        .expect("code sent");
    let state = auth.verify_mfa_code("123456").await.expect("code accepted");
    assert_eq!(state.email.as_deref(), Some(ADMIN_EMAIL));
    assert!(state.is_admin);
}

// ============================================================================
// Sign-in
// ============================================================================

#[tokio::test]
async fn test_sign_in_sends_expected_function_bodies() {
    let dir = tempfile::tempdir().expect("temp dir");
    let server = TestServer::start().await;
    script_admin(&server);

    let clock = Arc::new(ManualClock::new(start_time()));
    let (auth, store) = open_auth(&server, &dir.path().join("state.json"), clock);
    sign_in(&auth).await;

    let send = server.requests_to(SEND_CODE);
    assert_eq!(
        send.first().map(prayerline_integration_tests::RecordedRequest::json),
        Some(json!({"email": ADMIN_EMAIL, "actionType": "login"}))
    );
    let verify = server.requests_to(VERIFY_CODE);
    assert_eq!(
        verify.first().map(prayerline_integration_tests::RecordedRequest::json),
        Some(json!({"codeId": "code-1", "code": "123456", "email": ADMIN_EMAIL}))
    );

    assert_eq!(
        store.get(keys::APPROVAL_ADMIN_EMAIL).expect("read"),
        Some(ADMIN_EMAIL.to_string())
    );
    assert_eq!(store.get(keys::MFA_CODE_ID).expect("read"), None);
}

#[tokio::test]
async fn test_non_admin_cannot_request_code() {
    let dir = tempfile::tempdir().expect("temp dir");
    let server = TestServer::start().await;
    script_admin(&server);
    server.on(Method::GET, SUBSCRIBERS, Reply::json(json!([])));

    let clock = Arc::new(ManualClock::new(start_time()));
    let (auth, _) = open_auth(&server, &dir.path().join("state.json"), clock);

    let err = auth
        .send_mfa_code("visitor@church.org")
        .await
        .expect_err("non-admin is refused");
    assert!(matches!(err, AuthError::NotAuthorized), "got {err:?}");
    assert!(server.requests_to(SEND_CODE).is_empty());
}

#[tokio::test]
async fn test_rejected_code_reports_function_message() {
    let dir = tempfile::tempdir().expect("temp dir");
    let server = TestServer::start().await;
    script_admin(&server);
    server.on(
        Method::POST,
        VERIFY_CODE,
        Reply::json(json!({"success": false, "error": "Code expired"})),
    );

    let clock = Arc::new(ManualClock::new(start_time()));
    let (auth, _) = open_auth(&server, &dir.path().join("state.json"), clock);
    auth.send_mfa_code(ADMIN_EMAIL).await.expect("code sent");

    let err = auth
        .verify_mfa_code("000000")
        .await
        .expect_err("code rejected");
    assert_eq!(err.to_string(), "Code expired");
    assert!(!auth.state().is_admin);
}

#[tokio::test]
async fn test_verify_without_pending_code_makes_no_request() {
    let dir = tempfile::tempdir().expect("temp dir");
    let server = TestServer::start().await;
    script_admin(&server);

    let clock = Arc::new(ManualClock::new(start_time()));
    let (auth, _) = open_auth(&server, &dir.path().join("state.json"), clock);

    let err = auth
        .verify_mfa_code("123456")
        .await
        .expect_err("nothing pending");
    assert!(matches!(err, AuthError::NoMfaSession), "got {err:?}");
    assert!(server.requests().is_empty());
}

// ============================================================================
// Persisted sessions
// ============================================================================

#[tokio::test]
async fn test_session_restores_in_new_process() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("state.json");
    let server = TestServer::start().await;
    script_admin(&server);

    let clock = Arc::new(ManualClock::new(start_time()));
    {
        let (auth, _) = open_auth(&server, &path, clock.clone());
        sign_in(&auth).await;
        clock.advance(TimeDelta::minutes(20));
        auth.record_activity(ActivityEvent::KeyDown);
    }

    // 25 minutes after the last activity, 45 after sign-in
    clock.advance(TimeDelta::minutes(25));
    let (auth, _) = open_auth(&server, &path, clock);
    let state = auth.restore_session().await.expect("restore");

    assert_eq!(state.email.as_deref(), Some(ADMIN_EMAIL));
    assert!(state.is_admin);
    assert_eq!(auth.require_admin().expect("admin"), ADMIN_EMAIL);
}

#[tokio::test]
async fn test_expired_session_is_cleared_on_restore() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("state.json");
    let server = TestServer::start().await;
    script_admin(&server);

    let clock = Arc::new(ManualClock::new(start_time()));
    {
        let (auth, _) = open_auth(&server, &path, clock.clone());
        sign_in(&auth).await;
    }

    clock.advance(TimeDelta::minutes(31));
    server.clear_requests();
    let (auth, store) = open_auth(&server, &path, clock);
    let state = auth.restore_session().await.expect("restore");

    assert_eq!(state.email, None);
    assert!(!state.is_admin);
    assert!(server.requests_to(SUBSCRIBERS).is_empty());
    for key in keys::SESSION_MARKERS {
        assert_eq!(store.get(key).expect("read"), None, "{key} should be cleared");
    }
}

#[tokio::test]
async fn test_inactivity_expires_live_session() {
    let dir = tempfile::tempdir().expect("temp dir");
    let server = TestServer::start().await;
    script_admin(&server);

    let clock = Arc::new(ManualClock::new(start_time()));
    let (auth, _) = open_auth(&server, &dir.path().join("state.json"), clock.clone());
    sign_in(&auth).await;

    clock.advance(TimeDelta::minutes(29));
    assert_eq!(auth.check_inactivity(), InactivityOutcome::Active);

    clock.advance(TimeDelta::minutes(2));
    assert_eq!(auth.check_inactivity(), InactivityOutcome::Expired);
    assert!(!auth.state().is_admin);
    assert!(matches!(
        auth.require_admin(),
        Err(AuthError::AdminRequired)
    ));
}

// ============================================================================
// Blocked accounts
// ============================================================================

#[tokio::test]
async fn test_blocked_check_queries_at_most_once_a_minute() {
    let dir = tempfile::tempdir().expect("temp dir");
    let server = TestServer::start().await;
    script_admin(&server);

    let clock = Arc::new(ManualClock::new(start_time()));
    let (auth, _) = open_auth(&server, &dir.path().join("state.json"), clock.clone());
    sign_in(&auth).await;
    server.clear_requests();

    assert_eq!(auth.check_blocked_status("/").await, BlockedCheck::Clear);
    clock.advance(TimeDelta::seconds(20));
    assert_eq!(auth.check_blocked_status("/").await, BlockedCheck::Throttled);
    clock.advance(TimeDelta::seconds(20));
    assert_eq!(auth.check_blocked_status("/").await, BlockedCheck::Throttled);

    assert_eq!(server.requests_to(SUBSCRIBERS).len(), 1);
}

#[tokio::test]
async fn test_blocked_account_is_signed_out_with_redirect() {
    let dir = tempfile::tempdir().expect("temp dir");
    let server = TestServer::start().await;
    script_admin(&server);

    let clock = Arc::new(ManualClock::new(start_time()));
    let (auth, store) = open_auth(&server, &dir.path().join("state.json"), clock);
    sign_in(&auth).await;

    server.once(
        Method::GET,
        SUBSCRIBERS,
        Reply::json(json!([{"is_blocked": true}])),
    );
    let check = auth.check_blocked_status("/admin?tab=prayers").await;

    assert_eq!(
        check,
        BlockedCheck::Blocked {
            redirect: "/login?blocked=true&returnUrl=%2Fadmin%3Ftab%3Dprayers".to_string()
        }
    );
    let state = auth.state();
    assert!(state.blocked);
    assert_eq!(state.email, None);
    assert_eq!(store.get(keys::APPROVAL_ADMIN_EMAIL).expect("read"), None);
}

#[tokio::test]
async fn test_blocked_check_failure_keeps_session() {
    let dir = tempfile::tempdir().expect("temp dir");
    let server = TestServer::start().await;
    script_admin(&server);

    let clock = Arc::new(ManualClock::new(start_time()));
    let (auth, _) = open_auth(&server, &dir.path().join("state.json"), clock);
    sign_in(&auth).await;

    server.once(Method::GET, SUBSCRIBERS, Reply::status(500));
    assert_eq!(
        auth.check_blocked_status("/").await,
        BlockedCheck::CheckFailed
    );
    assert!(auth.state().is_admin);
}
