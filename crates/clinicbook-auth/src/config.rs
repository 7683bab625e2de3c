//! Authentication configuration
//!
//! Centralized configuration for every auth component. Durations are
//! human-readable in serialized form (`30m`, `7days`).

use clinicbook_audit::AuditConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AuthError, AuthResult};

/// Main authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token configuration
    pub token: TokenConfig,
    /// Session configuration
    pub session: SessionConfig,
    /// CSRF configuration
    pub csrf: CsrfConfig,
    /// Login lockout configuration
    pub rate_limit: RateLimitConfig,
    /// Password hashing configuration
    pub password: PasswordConfig,
    /// Audit log bounds
    pub audit: AuditConfig,
}

/// Token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// HMAC secret (at least 256 bits)
    pub secret: String,
    /// Access token lifetime
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,
    /// Refresh token lifetime
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
    /// Token issuer claim
    pub issuer: String,
    /// Token audience claim
    pub audience: String,
    /// Issue a new refresh token on every refresh and revoke the old one
    pub rotate_refresh_tokens: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(), // Must be set
            access_token_lifetime: Duration::from_secs(30 * 60), // 30 minutes
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            issuer: "clinicbook".to_string(),
            audience: "clinicbook-web".to_string(),
            rotate_refresh_tokens: true,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Absolute session timeout from login or last refresh
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Refresh proactively once less than this remains
    #[serde(with = "humantime_serde")]
    pub refresh_threshold: Duration,
    /// Background check interval while a session exists
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60), // 30 minutes
            refresh_threshold: Duration::from_secs(5 * 60), // 5 minutes
            check_interval: Duration::from_secs(60),
        }
    }
}

/// CSRF token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Token lifetime
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Random bytes per token
    pub token_length: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60), // 1 hour
            token_length: 32,
        }
    }
}

/// Login lockout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Failed attempts before lockout
    pub max_attempts: u32,
    /// Lockout duration once the threshold is reached
    #[serde(with = "humantime_serde")]
    pub lockout_duration: Duration,
    /// Idle time after which failed attempts are forgotten
    #[serde(with = "humantime_serde")]
    pub reset_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_duration: Duration::from_secs(15 * 60), // 15 minutes
            reset_window: Duration::from_secs(60 * 60), // 1 hour
        }
    }
}

/// Password hashing configuration (Argon2id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Memory cost in KiB (OWASP recommends 19456 KiB = 19 MiB minimum)
    pub memory_cost: u32,
    /// Time cost (iterations) - OWASP recommends 2 minimum
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
    /// Output hash length in bytes
    pub hash_length: u32,
    /// Pepper (additional secret, optional)
    pub pepper: Option<String>,
    /// Maximum accepted password length (to prevent DoS)
    pub max_password_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
            hash_length: 32,
            pepper: None,
            max_password_length: 128,
        }
    }
}

impl AuthConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            config.token.secret = secret;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            config.token.issuer = issuer;
        }
        if let Ok(audience) = std::env::var("JWT_AUDIENCE") {
            config.token.audience = audience;
        }
        if let Ok(pepper) = std::env::var("PASSWORD_PEPPER") {
            config.password.pepper = Some(pepper);
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.token.secret.is_empty() {
            errors.push("JWT secret must be set".to_string());
        } else if self.token.secret.len() < 32 {
            errors.push("JWT secret should be at least 256 bits (32 bytes)".to_string());
        }
        if self.token.access_token_lifetime >= self.token.refresh_token_lifetime {
            errors.push("Access token lifetime must be shorter than refresh token lifetime".to_string());
        }

        if self.session.refresh_threshold >= self.session.timeout {
            errors.push("Session refresh threshold must be shorter than the session timeout".to_string());
        }
        if self.session.check_interval.is_zero() {
            errors.push("Session check interval must be non-zero".to_string());
        }

        if self.csrf.token_length < 16 {
            errors.push("CSRF token length should be at least 128 bits (16 bytes)".to_string());
        }

        if self.rate_limit.max_attempts == 0 {
            errors.push("Max login attempts must be at least 1".to_string());
        }

        if self.audit.max_entries == 0 {
            errors.push("Audit log must retain at least one entry".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Convert a config duration for timestamp arithmetic
pub(crate) fn to_chrono(duration: Duration) -> AuthResult<chrono::Duration> {
    chrono::Duration::from_std(duration).map_err(|e| AuthError::Config(e.to_string()))
}
