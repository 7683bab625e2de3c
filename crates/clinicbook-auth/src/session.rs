//! Session Manager
//!
//! Keeps the single active session for a tab:
//! - Session record (identity + access token) in the tab-scoped store
//! - Refresh token in the profile-scoped store, so a reload can restore
//! - Absolute timeout measured from login or the last refresh
//! - Refresh token rotation with a revocation list of spent token ids

use chrono::{DateTime, Utc};
use clinicbook_store::{keys, StoreError, TypedStore};
use clinicbook_types::{Clock, SessionId, UserId, UserIdentity};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{to_chrono, SessionConfig};
use crate::error::{AuthError, AuthResult};
use crate::token::TokenService;
use crate::types::{Session, SessionRecord, TokenClaims, TokenType};

/// Revoked refresh token id → its expiry (Unix timestamp)
type RevocationList = BTreeMap<String, i64>;

/// Session manager over the tab and profile stores
#[derive(Clone)]
pub struct SessionManager {
    tab: TypedStore,
    profile: TypedStore,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        tab: TypedStore,
        profile: TypedStore,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            tab,
            profile,
            tokens,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Persist a session, replacing any existing one
    ///
    /// The stored expiry is `now + timeout`; the returned session carries it.
    pub async fn store(&self, mut session: Session, refresh_token: &str) -> AuthResult<Session> {
        let now = self.clock.now();
        session.expires_at = now + to_chrono(self.config.timeout)?;

        self.write_record(&session, now).await?;
        self.profile.set_string(keys::REFRESH_TOKEN, refresh_token).await?;

        tracing::debug!(session_id = %session.session_id, expires_at = %session.expires_at, "Stored session");
        Ok(session)
    }

    /// Current session, clearing everything if it has expired
    pub async fn get(&self) -> AuthResult<Option<Session>> {
        let Some(record) = self.read_record().await? else {
            return Ok(None);
        };

        if self.clock.now() > record.expires_at {
            tracing::info!(session_id = %record.data.session_id, "Session expired");
            self.clear().await?;
            return Ok(None);
        }

        Ok(Some(record.data))
    }

    /// Stored session without the expiry check
    pub async fn peek(&self) -> AuthResult<Option<Session>> {
        Ok(self.read_record().await?.map(|record| record.data))
    }

    pub async fn get_refresh_token(&self) -> AuthResult<Option<String>> {
        Ok(self.profile.get_string(keys::REFRESH_TOKEN).await?)
    }

    /// Remove the session record and refresh token
    pub async fn clear(&self) -> AuthResult<()> {
        self.tab.delete(keys::SESSION).await?;
        self.profile.delete(keys::REFRESH_TOKEN).await?;
        Ok(())
    }

    /// Revoke the stored refresh token, then clear
    pub async fn end(&self) -> AuthResult<()> {
        if let Some(token) = self.get_refresh_token().await? {
            if let Ok(claims) = self.tokens.decode(&token) {
                self.revoke(&claims.jti, claims.exp).await?;
            }
        }
        self.clear().await
    }

    /// Time left before the session expires
    pub async fn time_until_expiry(&self) -> AuthResult<Option<Duration>> {
        let now = self.clock.now();
        Ok(self
            .get()
            .await?
            .map(|session| (session.expires_at - now).to_std().unwrap_or(Duration::ZERO)))
    }

    /// Whether the session is inside the refresh threshold
    pub async fn needs_refresh(&self) -> AuthResult<bool> {
        Ok(self
            .time_until_expiry()
            .await?
            .map(|remaining| remaining < self.config.refresh_threshold)
            .unwrap_or(false))
    }

    /// Renew the session from the persisted refresh token
    ///
    /// Re-issues the access token and extends the expiry. With rotation on,
    /// the refresh token is replaced and the old one revoked. When the tab
    /// record is gone the session is rebuilt from the refresh token claims.
    /// Any failure clears the session.
    pub async fn refresh(&self) -> AuthResult<Session> {
        match self.try_refresh().await {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed");
                self.clear().await?;
                Err(e)
            }
        }
    }

    async fn try_refresh(&self) -> AuthResult<Session> {
        let token = self
            .get_refresh_token()
            .await?
            .ok_or(AuthError::SessionRefreshFailed)?;
        let claims = self.tokens.verify_kind(&token, TokenType::Refresh)?;

        if self.is_revoked(&claims.jti).await? {
            tracing::warn!(jti = %claims.jti, "Revoked refresh token presented");
            return Err(AuthError::InvalidToken);
        }

        let claimed = identity_from_claims(&claims)?;
        let now = self.clock.now();

        let (session_id, user, created_at) = match self.read_record().await? {
            Some(record) => {
                if record.data.user.id != claimed.id {
                    return Err(AuthError::InvalidToken);
                }
                (record.data.session_id, record.data.user, record.data.created_at)
            }
            None => {
                let session_id = claims
                    .sid
                    .as_deref()
                    .and_then(|sid| SessionId::parse(sid).ok())
                    .unwrap_or_default();
                tracing::info!(session_id = %session_id, "Restoring session from refresh token");
                (session_id, claimed, now)
            }
        };

        let access = self.tokens.issue(&user, Some(&session_id), TokenType::Access)?;
        let session = Session {
            session_id,
            user,
            access_token: access.token,
            created_at,
            expires_at: now + to_chrono(self.config.timeout)?,
        };
        self.write_record(&session, now).await?;

        if self.tokens.config().rotate_refresh_tokens {
            let next = self
                .tokens
                .issue(&session.user, Some(&session.session_id), TokenType::Refresh)?;
            self.profile.set_string(keys::REFRESH_TOKEN, &next.token).await?;
            self.revoke(&claims.jti, claims.exp).await?;
        }

        tracing::debug!(session_id = %session.session_id, expires_at = %session.expires_at, "Refreshed session");
        Ok(session)
    }

    /// Whether a refresh token id has been revoked
    pub async fn is_revoked(&self, jti: &str) -> AuthResult<bool> {
        Ok(self.revocations().await?.contains_key(jti))
    }

    /// Revoke a refresh token id until its own expiry
    pub async fn revoke(&self, jti: &str, expires_at: i64) -> AuthResult<()> {
        let now = self.clock.now().timestamp();
        let mut revoked = self.revocations().await?;
        revoked.retain(|_, exp| *exp >= now);
        revoked.insert(jti.to_string(), expires_at);
        self.profile.set(keys::REVOKED_REFRESH_TOKENS, &revoked).await?;
        Ok(())
    }

    /// A corrupt list is discarded; a failed read is an error so a spent
    /// token is never treated as live
    async fn revocations(&self) -> AuthResult<RevocationList> {
        match self
            .profile
            .get_or_default::<RevocationList>(keys::REVOKED_REFRESH_TOKENS)
            .await
        {
            Ok(list) => Ok(list),
            Err(StoreError::Serialization(e)) => {
                tracing::warn!(error = %e, "Discarding unreadable refresh token revocation list");
                Ok(RevocationList::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, session: &Session, now: DateTime<Utc>) -> AuthResult<()> {
        let record = SessionRecord {
            data: session.clone(),
            created_at: now,
            expires_at: session.expires_at,
        };
        self.tab.set(keys::SESSION, &record).await?;
        Ok(())
    }

    async fn read_record(&self) -> AuthResult<Option<SessionRecord>> {
        match self.tab.get::<SessionRecord>(keys::SESSION).await {
            Ok(record) => Ok(record),
            Err(StoreError::Serialization(e)) => {
                tracing::warn!(error = %e, "Discarding unreadable session record");
                self.tab.delete(keys::SESSION).await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Rebuild the identity a token was issued for
pub fn identity_from_claims(claims: &TokenClaims) -> AuthResult<UserIdentity> {
    let id = UserId::parse(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
    Ok(UserIdentity::new(id, &claims.email, claims.role, claims.name.clone()))
}
