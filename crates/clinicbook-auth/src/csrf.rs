//! CSRF Token Service
//!
//! One anti-forgery token per tab, stored as `{token, createdAt}`. Tokens are
//! never extended in place: a token past its TTL is rejected even when it
//! matches, and a fresh one must be issued.

use chrono::{DateTime, Utc};
use clinicbook_store::{keys, TypedStore};
use clinicbook_types::Clock;
use std::sync::Arc;

use crate::config::{to_chrono, CsrfConfig};
use crate::crypto;
use crate::error::{AuthError, AuthResult};
use crate::types::CsrfToken;

/// CSRF token service backed by the tab-scoped store
#[derive(Clone)]
pub struct CsrfService {
    store: TypedStore,
    clock: Arc<dyn Clock>,
    config: CsrfConfig,
}

impl CsrfService {
    pub fn new(store: TypedStore, clock: Arc<dyn Clock>, config: CsrfConfig) -> Self {
        Self { store, clock, config }
    }

    /// Generate a new token without persisting it
    pub fn generate(&self) -> CsrfToken {
        CsrfToken {
            token: crypto::random_hex(self.config.token_length),
            created_at: self.clock.now(),
        }
    }

    /// Exact constant-time match against a live stored token
    pub fn validate(&self, presented: &str, stored: &CsrfToken) -> bool {
        if presented.is_empty() || stored.token.is_empty() {
            return false;
        }
        crypto::constant_time_eq(presented, &stored.token) && !self.is_expired(stored.created_at)
    }

    /// Whether a token created at `created_at` is past its TTL
    pub fn is_expired(&self, created_at: DateTime<Utc>) -> bool {
        match to_chrono(self.config.ttl) {
            Ok(ttl) => self.clock.now() > created_at + ttl,
            Err(_) => true,
        }
    }

    /// Generate and persist a fresh token, replacing any prior one
    pub async fn issue(&self) -> AuthResult<CsrfToken> {
        let token = self.generate();
        self.store.set(keys::CSRF_TOKEN, &token).await?;
        tracing::debug!(fingerprint = %crypto::fingerprint(&token.token), "Issued CSRF token");
        Ok(token)
    }

    /// The stored token, regenerated when missing or expired
    pub async fn current(&self) -> AuthResult<CsrfToken> {
        match self.stored().await? {
            Some(token) if !self.is_expired(token.created_at) => Ok(token),
            _ => self.issue().await,
        }
    }

    /// Check a presented token against the stored one
    pub async fn check(&self, presented: &str) -> AuthResult<()> {
        let stored = self.stored().await?.ok_or(AuthError::CsrfInvalid)?;

        if presented.is_empty() || !crypto::constant_time_eq(presented, &stored.token) {
            return Err(AuthError::CsrfInvalid);
        }
        if self.is_expired(stored.created_at) {
            return Err(AuthError::CsrfExpired);
        }
        Ok(())
    }

    /// Remove the stored token
    pub async fn clear(&self) -> AuthResult<()> {
        self.store.delete(keys::CSRF_TOKEN).await?;
        Ok(())
    }

    async fn stored(&self) -> AuthResult<Option<CsrfToken>> {
        match self.store.get::<CsrfToken>(keys::CSRF_TOKEN).await {
            Ok(token) => Ok(token),
            // Unreadable record behaves as absent
            Err(clinicbook_store::StoreError::Serialization(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
