//! Core authentication types
//!
//! Shared types used across all authentication components.

use chrono::{DateTime, Utc};
use clinicbook_types::{SessionId, UserIdentity, UserRole};
use serde::{Deserialize, Serialize};

// =============================================================================
// Session Types
// =============================================================================

/// One authenticated browser context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session identifier
    pub session_id: SessionId,
    /// Authenticated user
    pub user: UserIdentity,
    /// Short-lived access token for API calls
    pub access_token: String,
    /// Login time
    pub created_at: DateTime<Utc>,
    /// Absolute expiry (moved forward only by refresh)
    pub expires_at: DateTime<Utc>,
}

/// Tab-scoped persisted form of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub data: Session,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Result of one background session check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    /// Nothing to check
    NoSession,
    /// Session is healthy
    Active { remaining: std::time::Duration },
    /// Session was below the refresh threshold and has been renewed
    Refreshed,
    /// Session had already expired; the user was logged out
    Expired,
    /// Proactive refresh failed; the user was logged out
    RefreshFailed,
}

// =============================================================================
// Token Types
// =============================================================================

/// Token type enum for JWT claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Token type
    pub token_type: TokenType,
    /// User email
    pub email: String,
    /// User role
    pub role: UserRole,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// JWT ID (unique identifier)
    pub jti: String,
    /// Session ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

/// A freshly minted token with its claims
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

/// JWT token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// Access token expiry (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiry (Unix timestamp)
    pub refresh_expires_at: i64,
    /// Refresh token id, for revocation
    pub refresh_jti: String,
}

// =============================================================================
// CSRF Types
// =============================================================================

/// Tab-scoped anti-forgery token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfToken {
    pub token: String,
    pub created_at: DateTime<Utc>,
}
