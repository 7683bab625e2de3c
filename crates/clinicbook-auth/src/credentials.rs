//! Credential verification
//!
//! The orchestrator only asks "who is this email + password?". Where the
//! answer comes from is behind [`CredentialVerifier`].

use async_trait::async_trait;
use clinicbook_types::UserIdentity;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::{AuthError, AuthResult};
use crate::password::PasswordService;
use crate::rate_limit::normalize_identifier;

/// Source of truth for email + password checks
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// The identity for a matching email and password, `None` otherwise
    async fn verify(&self, email: &str, password: &str) -> AuthResult<Option<UserIdentity>>;
}

/// A configured account: identity plus Argon2 PHC hash
#[derive(Debug, Clone)]
pub struct Account {
    pub identity: UserIdentity,
    pub password_hash: String,
}

/// In-memory accounts for the clinic's trusted admin and staff identities
#[derive(Clone)]
pub struct StaticCredentials {
    passwords: PasswordService,
    accounts: HashMap<String, Account>,
    /// Hash checked for unknown emails so misses cost the same as hits
    dummy_hash: Arc<OnceCell<String>>,
}

impl StaticCredentials {
    pub fn new(passwords: PasswordService) -> Self {
        Self {
            passwords,
            accounts: HashMap::new(),
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Register an account with an existing PHC hash
    pub fn with_account(mut self, identity: UserIdentity, password_hash: impl Into<String>) -> Self {
        self.accounts.insert(
            normalize_identifier(&identity.email),
            Account {
                identity,
                password_hash: password_hash.into(),
            },
        );
        self
    }

    /// Register an account from a plaintext password
    pub fn with_password(self, identity: UserIdentity, password: &str) -> AuthResult<Self> {
        let hash = self.passwords.hash_password(password)?;
        Ok(self.with_account(identity, hash))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    async fn dummy_hash(&self) -> AuthResult<String> {
        let passwords = self.passwords.clone();
        self.dummy_hash
            .get_or_try_init(|| async move {
                let secret = crate::crypto::random_hex(16);
                passwords.hash_password(&secret)
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify(&self, email: &str, password: &str) -> AuthResult<Option<UserIdentity>> {
        let account = self.accounts.get(&normalize_identifier(email)).cloned();
        let hash = match &account {
            Some(account) => account.password_hash.clone(),
            None => self.dummy_hash().await?,
        };

        let passwords = self.passwords.clone();
        let password = zeroize::Zeroizing::new(password.to_string());
        let matches = tokio::task::spawn_blocking(move || passwords.verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))??;

        Ok(match account {
            Some(account) if matches => Some(account.identity),
            _ => None,
        })
    }
}
