//! Security event records

use chrono::{DateTime, Utc};
use clinicbook_types::{SecurityEventId, UserId, UserIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of security-relevant actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailure,
    Logout,
    AccountLocked,
    AccountUnlocked,
    RateLimitExceeded,
    SessionRestored,
    SessionRefreshed,
    SessionRefreshFailed,
    SessionExpired,
    CsrfTokenRegenerated,
    CsrfValidationFailed,
    InvalidInput,
    UnauthorizedAccess,
    SuspiciousActivity,
    AuditLogExported,
    AuditLogCleared,
}

impl SecurityEventType {
    /// Wire name, e.g. `LOGIN_SUCCESS`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailure => "LOGIN_FAILURE",
            Self::Logout => "LOGOUT",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::AccountUnlocked => "ACCOUNT_UNLOCKED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SessionRestored => "SESSION_RESTORED",
            Self::SessionRefreshed => "SESSION_REFRESHED",
            Self::SessionRefreshFailed => "SESSION_REFRESH_FAILED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::CsrfTokenRegenerated => "CSRF_TOKEN_REGENERATED",
            Self::CsrfValidationFailed => "CSRF_VALIDATION_FAILED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
            Self::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            Self::AuditLogExported => "AUDIT_LOG_EXPORTED",
            Self::AuditLogCleared => "AUDIT_LOG_CLEARED",
        }
    }

    /// All known event types
    pub const ALL: [SecurityEventType; 17] = [
        Self::LoginSuccess,
        Self::LoginFailure,
        Self::Logout,
        Self::AccountLocked,
        Self::AccountUnlocked,
        Self::RateLimitExceeded,
        Self::SessionRestored,
        Self::SessionRefreshed,
        Self::SessionRefreshFailed,
        Self::SessionExpired,
        Self::CsrfTokenRegenerated,
        Self::CsrfValidationFailed,
        Self::InvalidInput,
        Self::UnauthorizedAccess,
        Self::SuspiciousActivity,
        Self::AuditLogExported,
        Self::AuditLogCleared,
    ];
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown event type: {s}"))
    }
}

/// Event severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Where an event was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvironment {
    /// Recording service name
    pub service: String,
    /// Recording service version
    pub version: String,
    /// Host name, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl Default for EventEnvironment {
    fn default() -> Self {
        Self {
            service: "clinicbook-auth".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: std::env::var("HOSTNAME").ok(),
        }
    }
}

/// Who triggered an event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Actor {
    pub user_id: Option<UserId>,
    pub email: Option<String>,
}

impl Actor {
    /// Actor known only by the email they typed
    pub fn email(email: &str) -> Self {
        Self {
            user_id: None,
            email: Some(email.to_string()),
        }
    }
}

impl From<&UserIdentity> for Actor {
    fn from(user: &UserIdentity) -> Self {
        Self {
            user_id: Some(user.id.clone()),
            email: Some(user.email.clone()),
        }
    }
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: SecurityEventId,
    pub timestamp: DateTime<Utc>,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    /// Free-form details (always a JSON object)
    pub details: serde_json::Map<String, serde_json::Value>,
    pub environment: EventEnvironment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&SecurityEventType::LoginSuccess).unwrap(),
            "\"LOGIN_SUCCESS\""
        );
        assert_eq!(
            serde_json::to_string(&SecurityEventType::CsrfValidationFailed).unwrap(),
            "\"CSRF_VALIDATION_FAILED\""
        );
    }

    #[test]
    fn test_as_str_matches_serde_for_all_types() {
        for t in SecurityEventType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json.trim_matches('"'), t.as_str());
            assert_eq!(t.as_str().parse::<SecurityEventType>().unwrap(), t);
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
    }
}
