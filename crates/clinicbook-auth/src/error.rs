//! Authentication error types
//!
//! Errors are designed to be:
//! - Informative for logging/debugging
//! - Safe for external exposure (no sensitive data leakage)
//! - Convertible into the `{success, error}` shape the UI renders

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Session;

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    // =========================================================================
    // Token Errors
    // =========================================================================
    /// Token is malformed, fails its integrity check, or has the wrong type
    #[error("Invalid token")]
    InvalidToken,

    /// Token has expired
    #[error("Token has expired")]
    TokenExpired,

    // =========================================================================
    // CSRF Errors
    // =========================================================================
    /// Presented CSRF token does not match the stored one
    #[error("Invalid CSRF token")]
    CsrfInvalid,

    /// CSRF token is past its lifetime
    #[error("CSRF token has expired")]
    CsrfExpired,

    // =========================================================================
    // Rate Limiting Errors
    // =========================================================================
    /// Too many attempts for this identifier
    #[error("Too many attempts, try again in {} minute(s)", minutes_ceil(.retry_after_ms))]
    RateLimited {
        /// Milliseconds until attempts are allowed again
        retry_after_ms: u64,
    },

    /// Account is locked due to too many failed logins
    #[error("Account is temporarily locked, try again in {} minute(s)", minutes_ceil(.retry_after_ms))]
    AccountLocked {
        /// Milliseconds until the account is unlocked
        retry_after_ms: u64,
    },

    // =========================================================================
    // Credential Errors
    // =========================================================================
    /// Wrong email or password
    #[error("Invalid email or password ({remaining_attempts} attempt(s) remaining)")]
    InvalidCredentials {
        /// Attempts left before lockout
        remaining_attempts: u32,
    },

    /// Missing or malformed input
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// No active session
    #[error("Authentication required")]
    Unauthenticated,

    /// Session has expired
    #[error("Session has expired")]
    SessionExpired,

    /// Session could not be refreshed
    #[error("Session refresh failed")]
    SessionRefreshFailed,

    /// Authenticated, but the role does not allow the action
    #[error("Insufficient permissions")]
    Forbidden,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Storage error
    #[error("Storage error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not be exposed to clients)
    #[error("Internal error")]
    Internal(String),
}

fn minutes_ceil(ms: &u64) -> u64 {
    ms.div_ceil(60_000).max(1)
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::ValidationFailed(_) => 400,

            // 401 Unauthorized
            Self::InvalidToken
            | Self::TokenExpired
            | Self::InvalidCredentials { .. }
            | Self::Unauthenticated
            | Self::SessionExpired
            | Self::SessionRefreshFailed => 401,

            // 403 Forbidden
            Self::CsrfInvalid | Self::CsrfExpired | Self::Forbidden => 403,

            // 429 Too Many Requests
            Self::RateLimited { .. } | Self::AccountLocked { .. } => 429,

            // 500 Internal Server Error
            Self::Store(_) | Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Get an error code for the client (safe to expose)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::CsrfInvalid => "CSRF_INVALID",
            Self::CsrfExpired => "CSRF_EXPIRED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionRefreshFailed => "SESSION_REFRESH_FAILED",
            Self::Forbidden => "FORBIDDEN",
            Self::Store(_) | Self::Config(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a refresh attempt could recover from this error
    pub fn is_refreshable(&self) -> bool {
        matches!(self, Self::TokenExpired | Self::SessionExpired)
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Get safe message for client (doesn't leak internal details)
    pub fn client_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Config(_) | Self::Internal(_) => {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Milliseconds until a retry makes sense, for lockout/throttle errors
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } | Self::AccountLocked { retry_after_ms } => {
                Some(*retry_after_ms)
            }
            _ => None,
        }
    }

    /// Create a rate limit error with retry-after duration
    pub fn rate_limited(duration: std::time::Duration) -> Self {
        Self::RateLimited {
            retry_after_ms: duration.as_millis() as u64,
        }
    }

    /// Create an account locked error with retry-after duration
    pub fn account_locked(duration: std::time::Duration) -> Self {
        Self::AccountLocked {
            retry_after_ms: duration.as_millis() as u64,
        }
    }
}

/// Outcome shape handed to the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    /// Human-readable error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl From<AuthResult<Session>> for AuthResponse {
    fn from(result: AuthResult<Session>) -> Self {
        match result {
            Ok(session) => Self {
                success: true,
                session: Some(session),
                error: None,
                code: None,
                remaining_attempts: None,
                retry_after_ms: None,
            },
            Err(error) => Self::from(&error),
        }
    }
}

impl From<&AuthError> for AuthResponse {
    fn from(error: &AuthError) -> Self {
        let remaining_attempts = match error {
            AuthError::InvalidCredentials { remaining_attempts } => Some(*remaining_attempts),
            AuthError::AccountLocked { .. } => Some(0),
            _ => None,
        };

        Self {
            success: false,
            session: None,
            error: Some(error.client_message()),
            code: Some(error.error_code().to_string()),
            remaining_attempts,
            retry_after_ms: error.retry_after_ms(),
        }
    }
}

impl From<clinicbook_store::StoreError> for AuthError {
    fn from(err: clinicbook_store::StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<clinicbook_audit::AuditError> for AuthError {
    fn from(err: clinicbook_audit::AuditError) -> Self {
        match err {
            clinicbook_audit::AuditError::UnsupportedFormat(format) => {
                Self::ValidationFailed(format!("Unsupported export format: {}", format))
            }
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            _ => Self::InvalidToken,
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::Internal(format!("Password hashing failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::ValidationFailed("email".into()).status_code(), 400);
        assert_eq!(AuthError::InvalidCredentials { remaining_attempts: 2 }.status_code(), 401);
        assert_eq!(AuthError::CsrfExpired.status_code(), 403);
        assert_eq!(AuthError::AccountLocked { retry_after_ms: 1 }.status_code(), 429);
        assert_eq!(AuthError::Store("down".into()).status_code(), 500);
    }

    #[test]
    fn test_client_message_hides_internal_details() {
        let err = AuthError::Store("sled path /secret/profile".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");
        assert!(err.is_server_error());
    }

    #[test]
    fn test_lockout_message_reports_minutes() {
        let err = AuthError::account_locked(std::time::Duration::from_secs(14 * 60 + 1));
        assert_eq!(
            err.client_message(),
            "Account is temporarily locked, try again in 15 minute(s)"
        );
        assert_eq!(err.retry_after_ms(), Some(841_000));
    }

    #[test]
    fn test_response_from_invalid_credentials() {
        let response = AuthResponse::from(&AuthError::InvalidCredentials { remaining_attempts: 3 });
        assert!(!response.success);
        assert_eq!(response.code.as_deref(), Some("INVALID_CREDENTIALS"));
        assert_eq!(response.remaining_attempts, Some(3));
        assert_eq!(response.retry_after_ms, None);
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let response = AuthResponse::from(&AuthError::CsrfInvalid);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], serde_json::json!(false));
        assert!(json.get("session").is_none());
        assert!(json.get("remaining_attempts").is_none());
    }

    #[test]
    fn test_refreshable_errors() {
        assert!(AuthError::TokenExpired.is_refreshable());
        assert!(!AuthError::InvalidToken.is_refreshable());
    }
}
