//! ClinicBook Authentication Layer
//!
//! Authentication, session and security core of the clinic booking site:
//!
//! - **Tokens**: HMAC-SHA256 signed access (30 min) and refresh (7 days)
//!   tokens with rotation and revocation
//! - **CSRF**: per-tab anti-forgery tokens with a one hour lifetime
//! - **Lockout**: failed-login counting with a 15 minute lockout
//! - **Sessions**: tab-scoped session records, restorable from the refresh
//!   token, refreshed proactively before expiry
//! - **Passwords**: Argon2id hashing (OWASP recommended)
//! - **Audit**: every outcome recorded through [`clinicbook_audit`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        AuthService                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  login ─► LoginRateLimiter ─► CredentialVerifier            │
//! │                                     │                       │
//! │              ┌──────────────────────┼───────────────┐       │
//! │              ▼                      ▼               ▼       │
//! │        TokenService          SessionManager    CsrfService  │
//! │              │                      │               │       │
//! │              └──────────────────────┼───────────────┘       │
//! │                                     ▼                       │
//! │                               AuditLogger                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state goes through injected [`clinicbook_store::KeyValueStore`]s and
//! all time through an injected [`clinicbook_types::Clock`].

pub mod config;
pub mod credentials;
pub mod crypto;
pub mod csrf;
pub mod error;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod token;
pub mod types;

pub use config::{AuthConfig, CsrfConfig, PasswordConfig, RateLimitConfig, SessionConfig, TokenConfig};
pub use credentials::{Account, CredentialVerifier, StaticCredentials};
pub use csrf::CsrfService;
pub use error::{AuthError, AuthResponse, AuthResult};
pub use password::PasswordService;
pub use rate_limit::{AttemptDecision, AttemptEntry, FailureOutcome, LoginRateLimiter};
pub use service::{AuthService, SessionMonitor};
pub use session::SessionManager;
pub use token::TokenService;
pub use types::*;
