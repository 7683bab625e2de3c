//! End-to-end flows through `AuthService` with in-memory stores and a
//! manually driven clock.

use std::sync::Arc;
use std::time::Duration;

use clinicbook_audit::{ExportFormat, SecurityEventType};
use clinicbook_auth::{
    AuthConfig, AuthError, AuthResponse, AuthService, AuthState, PasswordService, SessionCheck,
    StaticCredentials,
};
use clinicbook_store::{keys, KeyValueStore, MemoryStore};
use clinicbook_types::{Clock, ManualClock, UserId, UserIdentity, UserRole};

const ADMIN_EMAIL: &str = "admin@clinic.example";
const ADMIN_PASSWORD: &str = "correct horse battery staple";
const PATIENT_EMAIL: &str = "patient@clinic.example";
const PATIENT_PASSWORD: &str = "patient-password-1";

struct Harness {
    service: Arc<AuthService>,
    clock: ManualClock,
    tab: Arc<MemoryStore>,
    profile: Arc<MemoryStore>,
    credentials: Arc<StaticCredentials>,
}

fn test_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.token.secret = "integration-test-secret-0123456789abcdef".to_string();
    config.password.memory_cost = 1024;
    config.password.time_cost = 1;
    config
}

fn harness() -> Harness {
    let config = test_config();
    let credentials = StaticCredentials::new(PasswordService::new(config.password.clone()))
        .with_password(
            UserIdentity::new(UserId::new(), ADMIN_EMAIL, UserRole::Admin, "Clinic Admin"),
            ADMIN_PASSWORD,
        )
        .unwrap()
        .with_password(
            UserIdentity::new(UserId::new(), PATIENT_EMAIL, UserRole::Patient, "Pat Ient"),
            PATIENT_PASSWORD,
        )
        .unwrap();

    let clock = ManualClock::starting_now();
    let tab = Arc::new(MemoryStore::tab());
    let profile = Arc::new(MemoryStore::profile());
    let credentials = Arc::new(credentials);

    let service = AuthService::new(
        config,
        tab.clone(),
        profile.clone(),
        credentials.clone(),
        Arc::new(clock.clone()),
    )
    .unwrap();

    Harness {
        service: Arc::new(service),
        clock,
        tab,
        profile,
        credentials,
    }
}

async fn count(service: &AuthService, event_type: SecurityEventType) -> usize {
    service.audit().events_by_type(event_type).await.unwrap().len()
}

#[tokio::test]
async fn test_five_failures_lock_the_account_for_fifteen_minutes() {
    let h = harness();

    for expected_remaining in (1..5).rev() {
        let err = h.service.login(ADMIN_EMAIL, "wrong").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidCredentials { remaining_attempts } if remaining_attempts == expected_remaining
        ));
    }

    // Fifth failure triggers the lock
    let err = h.service.login(ADMIN_EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { retry_after_ms: 900_000 }));

    // Sixth attempt is refused even with the right password
    let err = h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap_err();
    assert_eq!(err.retry_after_ms(), Some(15 * 60 * 1000));
    assert_eq!(
        err.client_message(),
        "Account is temporarily locked, try again in 15 minute(s)"
    );
    let response = AuthResponse::from(&err);
    assert_eq!(response.remaining_attempts, Some(0));
    assert_eq!(response.code.as_deref(), Some("ACCOUNT_LOCKED"));

    assert_eq!(count(&h.service, SecurityEventType::LoginFailure).await, 5);
    assert_eq!(count(&h.service, SecurityEventType::AccountLocked).await, 1);
    assert_eq!(count(&h.service, SecurityEventType::RateLimitExceeded).await, 1);

    h.clock.advance(chrono::Duration::minutes(15));

    let session = h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
    assert_eq!(session.user.email, ADMIN_EMAIL);
    assert_eq!(h.service.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_lockout_still_applies_partway_through() {
    let h = harness();
    for _ in 0..5 {
        let _ = h.service.login(ADMIN_EMAIL, "wrong").await;
    }

    h.clock.advance(chrono::Duration::minutes(10));

    let err = h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap_err();
    assert_eq!(err.retry_after_ms(), Some(5 * 60 * 1000));
}

#[tokio::test]
async fn test_success_resets_failed_attempts() {
    let h = harness();
    for _ in 0..3 {
        let _ = h.service.login(ADMIN_EMAIL, "wrong").await;
    }
    assert_eq!(h.service.rate_limiter().remaining_attempts(ADMIN_EMAIL).await.unwrap(), 2);

    h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();

    assert_eq!(h.service.rate_limiter().remaining_attempts(ADMIN_EMAIL).await.unwrap(), 5);
    let err = h.service.login(ADMIN_EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials { remaining_attempts: 4 }));
}

#[tokio::test]
async fn test_unknown_email_counts_toward_lockout() {
    let h = harness();
    let err = h.service.login("ghost@clinic.example", "whatever").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials { remaining_attempts: 4 }));
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_counting() {
    let h = harness();

    let err = h.service.login("not-an-email", "pw").await.unwrap_err();
    assert!(matches!(err, AuthError::ValidationFailed(_)));
    let err = h.service.login(ADMIN_EMAIL, "").await.unwrap_err();
    assert!(matches!(err, AuthError::ValidationFailed(_)));

    assert_eq!(count(&h.service, SecurityEventType::InvalidInput).await, 2);
    assert_eq!(h.service.rate_limiter().remaining_attempts(ADMIN_EMAIL).await.unwrap(), 5);
    assert_eq!(h.service.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_email_is_normalized_on_login() {
    let h = harness();
    let session = h.service.login("  ADMIN@Clinic.Example ", ADMIN_PASSWORD).await.unwrap();
    assert_eq!(session.user.email, ADMIN_EMAIL);
    assert_eq!(session.user.role, UserRole::Admin);
}

#[tokio::test]
async fn test_proactive_refresh_then_refresh_failure() {
    let h = harness();
    let mut state = h.service.subscribe();

    let session = h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), AuthState::Authenticated);

    h.clock.advance(chrono::Duration::minutes(26));
    assert_eq!(h.service.check_session().await, SessionCheck::Refreshed);

    let refreshed = h.service.current_session().await.unwrap().unwrap();
    assert_eq!(refreshed.session_id, session.session_id);
    assert_eq!(refreshed.expires_at, h.clock.now() + chrono::Duration::minutes(30));
    assert_eq!(count(&h.service, SecurityEventType::SessionRefreshed).await, 1);

    // Next check is healthy
    assert!(matches!(h.service.check_session().await, SessionCheck::Active { .. }));

    h.profile
        .set(keys::REFRESH_TOKEN, "corrupted.refresh.token".to_string())
        .await
        .unwrap();
    h.clock.advance(chrono::Duration::minutes(26));

    assert_eq!(h.service.check_session().await, SessionCheck::RefreshFailed);
    assert!(!h.service.is_session_valid().await);
    assert_eq!(h.service.state(), AuthState::Unauthenticated);
    assert_eq!(*state.borrow_and_update(), AuthState::Unauthenticated);
    assert_eq!(count(&h.service, SecurityEventType::SessionRefreshFailed).await, 1);
    assert_eq!(count(&h.service, SecurityEventType::SuspiciousActivity).await, 1);
    assert_eq!(count(&h.service, SecurityEventType::Logout).await, 1);
}

#[tokio::test]
async fn test_session_expires_without_refresh() {
    let h = harness();
    h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();

    h.clock.advance(chrono::Duration::minutes(31));

    assert!(matches!(h.service.require_session().await, Err(AuthError::SessionExpired)));
    assert!(matches!(h.service.require_session().await, Err(AuthError::Unauthenticated)));
    assert_eq!(h.service.check_session().await, SessionCheck::NoSession);
    assert_eq!(count(&h.service, SecurityEventType::SessionExpired).await, 1);
    assert_eq!(h.service.sessions().get_refresh_token().await.unwrap(), None);
}

#[tokio::test]
async fn test_check_session_reports_expiry() {
    let h = harness();
    h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();

    h.clock.advance(chrono::Duration::minutes(45));

    assert_eq!(h.service.check_session().await, SessionCheck::Expired);
    assert_eq!(h.service.state(), AuthState::Unauthenticated);
    assert!(h.tab.get(keys::SESSION).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reload_restores_session_from_refresh_token() {
    let h = harness();
    let session = h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();

    // A new tab: fresh tab store, same profile store
    let reloaded = AuthService::new(
        test_config(),
        Arc::new(MemoryStore::tab()),
        h.profile.clone(),
        h.credentials.clone(),
        Arc::new(h.clock.clone()),
    )
    .unwrap();

    let restored = reloaded.initialize().await.unwrap().unwrap();
    assert_eq!(restored.session_id, session.session_id);
    assert_eq!(restored.user, session.user);
    assert_eq!(reloaded.state(), AuthState::Authenticated);
    assert_eq!(count(&reloaded, SecurityEventType::SessionRestored).await, 1);
}

#[tokio::test]
async fn test_initialize_without_session() {
    let h = harness();
    assert_eq!(h.service.initialize().await.unwrap(), None);
    assert_eq!(h.service.state(), AuthState::Unauthenticated);
    assert!(h.tab.get(keys::CSRF_TOKEN).await.unwrap().is_some());
}

#[tokio::test]
async fn test_logout_clears_session_and_rotates_csrf() {
    let h = harness();
    h.service.initialize().await.unwrap();
    let csrf_before = h.service.csrf_token().await.unwrap();
    let session = h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();

    h.service.logout().await.unwrap();

    assert!(!h.service.is_session_valid().await);
    assert_eq!(h.service.sessions().get_refresh_token().await.unwrap(), None);
    assert!(!h.service.validate_csrf_token(&csrf_before).await);
    assert!(h.service.validate_csrf_token(&h.service.csrf_token().await.unwrap()).await);

    let logouts = h.service.audit().events_by_type(SecurityEventType::Logout).await.unwrap();
    assert_eq!(logouts.len(), 1);
    assert_eq!(logouts[0].user_id.as_ref(), Some(&session.user.id));
    assert_eq!(count(&h.service, SecurityEventType::CsrfTokenRegenerated).await, 1);
}

#[tokio::test]
async fn test_csrf_token_expires_after_an_hour() {
    let h = harness();
    h.service.initialize().await.unwrap();
    let token = h.service.csrf_token().await.unwrap();

    assert!(h.service.validate_csrf_token(&token).await);
    assert!(!h.service.validate_csrf_token("forged").await);

    h.clock.advance(chrono::Duration::minutes(61));
    assert!(!h.service.validate_csrf_token(&token).await);

    let failures = h
        .service
        .audit()
        .events_by_type(SecurityEventType::CsrfValidationFailed)
        .await
        .unwrap();
    assert_eq!(failures.len(), 2);
    // Newest first
    assert_eq!(failures[0].details["reason"], "CSRF_EXPIRED");
    assert_eq!(failures[1].details["reason"], "CSRF_INVALID");

    let renewed = h.service.csrf_token().await.unwrap();
    assert_ne!(renewed, token);
}

#[tokio::test]
async fn test_access_tokens_authorize_api_calls() {
    let h = harness();
    let session = h.service.login(PATIENT_EMAIL, PATIENT_PASSWORD).await.unwrap();

    let claims = h.service.authorize(&session.access_token).await.unwrap();
    assert_eq!(claims.email, PATIENT_EMAIL);

    assert!(matches!(
        h.service.authorize_audit_access(&session.access_token).await,
        Err(AuthError::Forbidden)
    ));
    assert!(matches!(h.service.authorize("garbage").await, Err(AuthError::InvalidToken)));

    let refresh = h.service.sessions().get_refresh_token().await.unwrap().unwrap();
    assert!(matches!(h.service.authorize(&refresh).await, Err(AuthError::InvalidToken)));
    assert_eq!(count(&h.service, SecurityEventType::UnauthorizedAccess).await, 3);

    h.clock.advance(chrono::Duration::minutes(31));
    assert!(matches!(
        h.service.authorize(&session.access_token).await,
        Err(AuthError::TokenExpired)
    ));
}

#[tokio::test]
async fn test_admin_exports_and_clears_audit_log() {
    let h = harness();
    let session = h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
    h.service.authorize_audit_access(&session.access_token).await.unwrap();

    let json = h.service.export_audit_log(ExportFormat::Json).await.unwrap();
    let events: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_type"], "LOGIN_SUCCESS");

    let csv = h.service.export_audit_log(ExportFormat::Csv).await.unwrap();
    assert!(csv.starts_with("id,timestamp,event_type,severity"));
    assert_eq!(count(&h.service, SecurityEventType::AuditLogExported).await, 2);

    h.service.clear_audit_log().await.unwrap();
    let remaining = h.service.audit().all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].event_type, SecurityEventType::AuditLogCleared);
}

#[tokio::test]
async fn test_operator_unlock() {
    let h = harness();
    for _ in 0..5 {
        let _ = h.service.login(ADMIN_EMAIL, "wrong").await;
    }

    assert!(h.service.unlock(" Admin@Clinic.Example").await.unwrap());
    assert!(!h.service.unlock(ADMIN_EMAIL).await.unwrap());
    assert_eq!(count(&h.service, SecurityEventType::AccountUnlocked).await, 1);

    h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
}

#[tokio::test]
async fn test_new_login_replaces_existing_session() {
    let h = harness();
    let first = h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
    let first_refresh = h.service.sessions().get_refresh_token().await.unwrap().unwrap();

    let second = h.service.login(PATIENT_EMAIL, PATIENT_PASSWORD).await.unwrap();

    assert_ne!(first.session_id, second.session_id);
    let current = h.service.current_session().await.unwrap().unwrap();
    assert_eq!(current.user.email, PATIENT_EMAIL);

    let claims = h.service.tokens().decode(&first_refresh).unwrap();
    assert!(h.service.sessions().is_revoked(&claims.jti).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_session_monitor_refreshes_in_background() {
    let h = harness();
    h.service.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
    let monitor = h.service.spawn_session_monitor();
    assert!(monitor.is_running());

    h.clock.advance(chrono::Duration::minutes(26));
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(count(&h.service, SecurityEventType::SessionRefreshed).await, 1);
    assert!(h.service.is_session_valid().await);

    drop(monitor);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = AuthService::new(
        AuthConfig::default(),
        Arc::new(MemoryStore::tab()),
        Arc::new(MemoryStore::profile()),
        Arc::new(StaticCredentials::new(PasswordService::new(Default::default()))),
        Arc::new(ManualClock::starting_now()),
    );
    assert!(matches!(result, Err(AuthError::Config(_))));
}
