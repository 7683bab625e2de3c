//! ClinicBook Store - injected repositories for auth state
//!
//! Every piece of persisted auth state (session record, refresh token, CSRF
//! token, login-attempt table, audit log) goes through the [`KeyValueStore`]
//! trait instead of process-global state, so tests can swap in a
//! [`MemoryStore`].
//!
//! # Scopes
//!
//! - **Tab scope**: lives as long as one browser context. Use [`MemoryStore`].
//! - **Profile scope**: survives reloads. Use [`SledStore`] (or a
//!   [`MemoryStore`] in tests).

pub mod error;
pub mod memory;
pub mod persistent;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod typed;

use async_trait::async_trait;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use persistent::SledStore;
pub use typed::TypedStore;

/// Storage keys used by the auth subsystem
pub mod keys {
    /// Tab scope: `{data, createdAt, expiresAt}` session record
    pub const SESSION: &str = "clinicbook.session";
    /// Tab scope: `{token, createdAt}` CSRF record
    pub const CSRF_TOKEN: &str = "clinicbook.csrf_token";
    /// Profile scope: opaque refresh token string
    pub const REFRESH_TOKEN: &str = "clinicbook.refresh_token";
    /// Profile scope: identifier → failed-attempt entry
    pub const LOGIN_ATTEMPTS: &str = "clinicbook.login_attempts";
    /// Profile scope: revoked refresh token ids → their expiry
    pub const REVOKED_REFRESH_TOKENS: &str = "clinicbook.revoked_refresh_tokens";
    /// Profile scope: ordered array of security events
    pub const AUDIT_LOG: &str = "clinicbook.security_audit_log";
}

/// Lifetime class of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    /// Cleared when the browser context goes away
    Tab,
    /// Survives reloads
    Profile,
}

impl std::fmt::Display for StorageScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tab => write!(f, "tab"),
            Self::Profile => write!(f, "profile"),
        }
    }
}

/// Minimal string key/value repository
///
/// Writes are last-writer-wins; there are no cross-key transactions.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Scope of the values held by this store
    fn scope(&self) -> StorageScope;

    /// Read a raw value
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a raw value, replacing any previous one
    async fn set(&self, key: &str, value: String) -> StoreResult<()>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> StoreResult<bool>;
}
