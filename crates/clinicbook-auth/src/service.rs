//! Auth Orchestrator
//!
//! Composes every auth component behind the calls the rest of the booking
//! site makes: login, logout, session validity, CSRF checks and audit
//! access.
//!
//! ```text
//! login ─► sanitize ─► LoginRateLimiter ─► CredentialVerifier
//!                                             │
//!              ┌──────────── ok ──────────────┴──── miss ───────────┐
//!              ▼                                                   ▼
//!   TokenService::issue_pair                       LoginRateLimiter::record_failure
//!   SessionManager::store                                         │
//!              │                                                   │
//!              └──────────────► AuditLogger::log ◄─────────────────┘
//! ```
//!
//! State (`Unauthenticated → Authenticating → Authenticated`) is published
//! on a watch channel so a UI can react to logouts triggered by expiry.

use clinicbook_audit::{Actor, AuditLogger, ExportFormat, SecurityEventType, Severity};
use clinicbook_store::{KeyValueStore, TypedStore};
use clinicbook_types::{Clock, SessionId};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::AuthConfig;
use crate::credentials::CredentialVerifier;
use crate::csrf::CsrfService;
use crate::error::{AuthError, AuthResult};
use crate::rate_limit::{normalize_identifier, LoginRateLimiter};
use crate::session::SessionManager;
use crate::token::TokenService;
use crate::types::{AuthState, Session, SessionCheck, TokenClaims, TokenType};

/// Longest accepted email address
const MAX_EMAIL_LENGTH: usize = 254;

/// Main authentication service combining all components
pub struct AuthService {
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    tokens: TokenService,
    csrf: CsrfService,
    rate_limiter: LoginRateLimiter,
    sessions: SessionManager,
    audit: AuditLogger,
    credentials: Arc<dyn CredentialVerifier>,
    state: watch::Sender<AuthState>,
    /// One login in flight at a time
    login_gate: Mutex<()>,
}

impl AuthService {
    /// Create the service over a tab-scoped and a profile-scoped store
    pub fn new(
        config: AuthConfig,
        tab: Arc<dyn KeyValueStore>,
        profile: Arc<dyn KeyValueStore>,
        credentials: Arc<dyn CredentialVerifier>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        config.validate().map_err(|errors| AuthError::Config(errors.join("; ")))?;

        let tab = TypedStore::new(tab);
        let profile = TypedStore::new(profile);

        let tokens = TokenService::new(config.token.clone(), clock.clone());
        let csrf = CsrfService::new(tab.clone(), clock.clone(), config.csrf.clone());
        let rate_limiter = LoginRateLimiter::new(profile.clone(), clock.clone(), config.rate_limit.clone());
        let sessions = SessionManager::new(
            tab,
            profile.clone(),
            tokens.clone(),
            clock.clone(),
            config.session.clone(),
        );
        let audit = AuditLogger::new(profile, clock.clone(), config.audit.clone());
        let (state, _) = watch::channel(AuthState::Unauthenticated);

        Ok(Self {
            config,
            clock,
            tokens,
            csrf,
            rate_limiter,
            sessions,
            audit,
            credentials,
            state,
            login_gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn csrf(&self) -> &CsrfService {
        &self.csrf
    }

    pub fn rate_limiter(&self) -> &LoginRateLimiter {
        &self.rate_limiter
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Current orchestrator state
    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: AuthState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "Auth state changed");
        }
    }

    async fn record(
        &self,
        event_type: SecurityEventType,
        severity: Severity,
        details: serde_json::Value,
        actor: Option<Actor>,
    ) {
        self.audit.log(event_type, severity, details, actor).await;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Prepare a freshly opened tab
    ///
    /// Issues a CSRF token and restores the session from the tab store, or
    /// from the persisted refresh token after a reload.
    pub async fn initialize(&self) -> AuthResult<Option<Session>> {
        self.csrf.issue().await?;

        if let Some(session) = self.sessions.get().await? {
            self.set_state(AuthState::Authenticated);
            return Ok(Some(session));
        }

        if self.sessions.get_refresh_token().await?.is_none() {
            self.set_state(AuthState::Unauthenticated);
            return Ok(None);
        }

        match self.sessions.refresh().await {
            Ok(session) => {
                self.record(
                    SecurityEventType::SessionRestored,
                    Severity::Low,
                    json!({ "session_id": session.session_id.to_string() }),
                    Some(Actor::from(&session.user)),
                )
                .await;
                tracing::info!(user = %session.user.email, "Session restored");
                self.set_state(AuthState::Authenticated);
                Ok(Some(session))
            }
            Err(e) => {
                self.record(
                    SecurityEventType::SessionRefreshFailed,
                    Severity::Medium,
                    json!({ "reason": e.error_code(), "phase": "restore" }),
                    None,
                )
                .await;
                self.set_state(AuthState::Unauthenticated);
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Login / Logout
    // =========================================================================

    /// Authenticate with email and password
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Session> {
        let _gate = self.login_gate.lock().await;

        let email = match sanitize_credentials(email, password) {
            Ok(email) => email,
            Err(e) => {
                self.record(
                    SecurityEventType::InvalidInput,
                    Severity::Low,
                    json!({ "field": "login", "reason": e.to_string() }),
                    None,
                )
                .await;
                return Err(e);
            }
        };

        let previous = self.state();
        self.set_state(AuthState::Authenticating);

        let result = self.attempt_login(&email, password).await;
        match &result {
            Ok(_) => self.set_state(AuthState::Authenticated),
            Err(_) => self.set_state(previous),
        }
        result
    }

    async fn attempt_login(&self, email: &str, password: &str) -> AuthResult<Session> {
        let decision = self.rate_limiter.can_attempt(email).await?;
        if !decision.allowed {
            let retry_after = decision.remaining_time.unwrap_or(Duration::ZERO);
            self.record(
                SecurityEventType::RateLimitExceeded,
                Severity::Medium,
                json!({ "retry_after_ms": retry_after.as_millis() as u64 }),
                Some(Actor::email(email)),
            )
            .await;
            tracing::warn!(email = %email, "Login attempt while locked out");
            return Err(AuthError::account_locked(retry_after));
        }

        let Some(user) = self.credentials.verify(email, password).await? else {
            return Err(self.login_failed(email).await?);
        };

        // A new login replaces any existing session entirely
        self.sessions.end().await?;

        let session_id = SessionId::new();
        let pair = self.tokens.issue_pair(&user, &session_id)?;
        let now = self.clock.now();
        let session = Session {
            session_id,
            user,
            access_token: pair.access_token,
            created_at: now,
            expires_at: now,
        };
        let session = self.sessions.store(session, &pair.refresh_token).await?;
        self.rate_limiter.record_success(email).await?;

        self.record(
            SecurityEventType::LoginSuccess,
            Severity::Low,
            json!({
                "session_id": session.session_id.to_string(),
                "role": session.user.role.to_string(),
            }),
            Some(Actor::from(&session.user)),
        )
        .await;
        tracing::info!(user = %session.user.email, role = %session.user.role, "Login succeeded");

        Ok(session)
    }

    /// Count a failed login and build the error to return
    async fn login_failed(&self, email: &str) -> AuthResult<AuthError> {
        let outcome = self.rate_limiter.record_failure(email).await?;

        self.record(
            SecurityEventType::LoginFailure,
            Severity::Medium,
            json!({
                "attempts": outcome.attempts,
                "remaining_attempts": outcome.remaining_attempts,
            }),
            Some(Actor::email(email)),
        )
        .await;

        if outcome.just_locked {
            let lockout = self.config.rate_limit.lockout_duration;
            self.record(
                SecurityEventType::AccountLocked,
                Severity::High,
                json!({
                    "attempts": outcome.attempts,
                    "locked_until": outcome.locked_until.map(|t| t.to_rfc3339()),
                    "lockout_ms": lockout.as_millis() as u64,
                }),
                Some(Actor::email(email)),
            )
            .await;
            return Ok(AuthError::account_locked(lockout));
        }

        tracing::info!(email = %email, remaining = outcome.remaining_attempts, "Login failed");
        Ok(AuthError::InvalidCredentials {
            remaining_attempts: outcome.remaining_attempts,
        })
    }

    /// End the session and rotate the CSRF token
    pub async fn logout(&self) -> AuthResult<()> {
        let session = self.sessions.peek().await?;

        self.record(
            SecurityEventType::Logout,
            Severity::Low,
            json!({ "session_id": session.as_ref().map(|s| s.session_id.to_string()) }),
            session.as_ref().map(|s| Actor::from(&s.user)),
        )
        .await;

        self.sessions.end().await?;
        self.set_state(AuthState::Unauthenticated);

        self.csrf.issue().await?;
        self.record(
            SecurityEventType::CsrfTokenRegenerated,
            Severity::Low,
            json!({ "reason": "logout" }),
            session.as_ref().map(|s| Actor::from(&s.user)),
        )
        .await;

        if let Some(session) = session {
            tracing::info!(user = %session.user.email, "Logged out");
        }
        Ok(())
    }

    /// Operator reset of a lockout; true if the identifier had an entry
    pub async fn unlock(&self, email: &str) -> AuthResult<bool> {
        let removed = self.rate_limiter.reset(email).await?;
        if removed {
            self.record(
                SecurityEventType::AccountUnlocked,
                Severity::Medium,
                json!({ "by": "operator" }),
                Some(Actor::email(&normalize_identifier(email))),
            )
            .await;
        }
        Ok(removed)
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Renew the session; logs out on failure
    pub async fn refresh_session(&self) -> bool {
        let previous = self.sessions.peek().await.ok().flatten();

        match self.sessions.refresh().await {
            Ok(session) => {
                self.record(
                    SecurityEventType::SessionRefreshed,
                    Severity::Low,
                    json!({
                        "session_id": session.session_id.to_string(),
                        "expires_at": session.expires_at.to_rfc3339(),
                    }),
                    Some(Actor::from(&session.user)),
                )
                .await;
                self.set_state(AuthState::Authenticated);
                true
            }
            Err(e) => {
                let actor = previous.as_ref().map(|s| Actor::from(&s.user));
                self.record(
                    SecurityEventType::SessionRefreshFailed,
                    Severity::Medium,
                    json!({ "reason": e.error_code() }),
                    actor.clone(),
                )
                .await;

                if previous.is_some() && matches!(e, AuthError::InvalidToken) {
                    self.record(
                        SecurityEventType::SuspiciousActivity,
                        Severity::High,
                        json!({ "reason": "refresh token rejected for an active session" }),
                        actor,
                    )
                    .await;
                }

                if let Err(logout_err) = self.logout().await {
                    tracing::warn!(error = %logout_err, "Logout after failed refresh did not complete");
                }
                false
            }
        }
    }

    /// Whether a live session exists
    pub async fn is_session_valid(&self) -> bool {
        match self.current_session().await {
            Ok(session) => session.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed");
                false
            }
        }
    }

    /// The live session, if any
    pub async fn current_session(&self) -> AuthResult<Option<Session>> {
        let stored = self.sessions.peek().await?;
        let live = self.sessions.get().await?;

        if let (Some(session), None) = (&stored, &live) {
            self.on_expired(session).await;
        }
        Ok(live)
    }

    /// The live session, or why there is none
    pub async fn require_session(&self) -> AuthResult<Session> {
        let had_session = self.sessions.peek().await?.is_some();
        match self.current_session().await? {
            Some(session) => Ok(session),
            None if had_session => Err(AuthError::SessionExpired),
            None => Err(AuthError::Unauthenticated),
        }
    }

    /// Verify an access token presented with an API call
    pub async fn authorize(&self, access_token: &str) -> AuthResult<TokenClaims> {
        match self.tokens.verify_kind(access_token, TokenType::Access) {
            Ok(claims) => Ok(claims),
            Err(e) => {
                if matches!(e, AuthError::InvalidToken) {
                    self.record(
                        SecurityEventType::UnauthorizedAccess,
                        Severity::Medium,
                        json!({ "reason": e.error_code() }),
                        None,
                    )
                    .await;
                }
                Err(e)
            }
        }
    }

    /// One tick of the background session check
    pub async fn check_session(&self) -> SessionCheck {
        let session = match self.sessions.peek().await {
            Ok(Some(session)) => session,
            Ok(None) => return SessionCheck::NoSession,
            Err(e) => {
                tracing::warn!(error = %e, "Session check could not read the session");
                return SessionCheck::NoSession;
            }
        };

        let now = self.clock.now();
        if now > session.expires_at {
            if let Err(e) = self.sessions.clear().await {
                tracing::warn!(error = %e, "Failed to clear expired session");
            }
            self.on_expired(&session).await;
            return SessionCheck::Expired;
        }

        let remaining = (session.expires_at - now).to_std().unwrap_or(Duration::ZERO);
        if remaining < self.config.session.refresh_threshold {
            tracing::debug!(remaining_secs = remaining.as_secs(), "Refreshing session proactively");
            return if self.refresh_session().await {
                SessionCheck::Refreshed
            } else {
                SessionCheck::RefreshFailed
            };
        }

        SessionCheck::Active { remaining }
    }

    async fn on_expired(&self, session: &Session) {
        self.record(
            SecurityEventType::SessionExpired,
            Severity::Low,
            json!({ "session_id": session.session_id.to_string() }),
            Some(Actor::from(&session.user)),
        )
        .await;
        tracing::info!(user = %session.user.email, "Session expired");
        self.set_state(AuthState::Unauthenticated);
    }

    /// Run [`Self::check_session`] every `check_interval` until dropped
    pub fn spawn_session_monitor(self: &Arc<Self>) -> SessionMonitor {
        let service = Arc::clone(self);
        let period = self.config.session.check_interval;

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                match service.check_session().await {
                    SessionCheck::Expired | SessionCheck::RefreshFailed => {
                        tracing::info!("Session monitor logged the user out");
                    }
                    SessionCheck::Refreshed => tracing::debug!("Session monitor refreshed the session"),
                    SessionCheck::Active { .. } | SessionCheck::NoSession => {}
                }
            }
        });

        SessionMonitor { handle }
    }

    // =========================================================================
    // CSRF
    // =========================================================================

    /// The tab's CSRF token, regenerated when missing or expired
    pub async fn csrf_token(&self) -> AuthResult<String> {
        Ok(self.csrf.current().await?.token)
    }

    /// Check a presented CSRF token; failures are audited
    pub async fn validate_csrf_token(&self, token: &str) -> bool {
        match self.csrf.check(token).await {
            Ok(()) => true,
            Err(e) => {
                let actor = self.sessions.peek().await.ok().flatten().map(|s| Actor::from(&s.user));
                self.record(
                    SecurityEventType::CsrfValidationFailed,
                    Severity::Medium,
                    json!({ "reason": e.error_code() }),
                    actor,
                )
                .await;
                tracing::warn!(reason = e.error_code(), "CSRF validation failed");
                false
            }
        }
    }

    // =========================================================================
    // Audit access
    // =========================================================================

    /// Verify an access token whose role may read the audit log
    pub async fn authorize_audit_access(&self, access_token: &str) -> AuthResult<TokenClaims> {
        let claims = self.authorize(access_token).await?;
        if !claims.role.can_view_audit_log() {
            self.record(
                SecurityEventType::UnauthorizedAccess,
                Severity::High,
                json!({ "resource": "audit_log", "role": claims.role.to_string() }),
                Some(Actor::email(&claims.email)),
            )
            .await;
            return Err(AuthError::Forbidden);
        }
        Ok(claims)
    }

    /// Render the audit log and record the export
    pub async fn export_audit_log(&self, format: ExportFormat) -> AuthResult<String> {
        let rendered = self.audit.export(format).await?;
        self.record(
            SecurityEventType::AuditLogExported,
            Severity::Medium,
            json!({ "format": format.to_string() }),
            None,
        )
        .await;
        Ok(rendered)
    }

    /// Wipe the audit log, leaving a record of the wipe
    pub async fn clear_audit_log(&self) -> AuthResult<()> {
        self.audit.clear().await?;
        self.record(SecurityEventType::AuditLogCleared, Severity::High, json!({}), None)
            .await;
        Ok(())
    }
}

/// Background session checker; aborts when dropped
pub struct SessionMonitor {
    handle: JoinHandle<()>,
}

impl SessionMonitor {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Normalize login input, rejecting what cannot be an account
pub fn sanitize_credentials(email: &str, password: &str) -> AuthResult<String> {
    let email = email.trim().to_lowercase();

    if email.is_empty() {
        return Err(AuthError::ValidationFailed("Email is required".to_string()));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AuthError::ValidationFailed("Email is too long".to_string()));
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AuthError::ValidationFailed("Email contains invalid characters".to_string()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.contains('@') => {}
        _ => return Err(AuthError::ValidationFailed("Email address is malformed".to_string())),
    }
    if password.is_empty() {
        return Err(AuthError::ValidationFailed("Password is required".to_string()));
    }

    Ok(email)
}
