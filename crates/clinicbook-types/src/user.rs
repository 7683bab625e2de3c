//! Authenticated user identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::identity::UserId;

/// Account roles known to the clinic dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Patient booking consultations
    #[default]
    Patient,
    /// Clinic staff (staff dashboard)
    Staff,
    /// Administrator (admin dashboard, audit log access)
    Admin,
}

impl UserRole {
    /// Whether this role may read and export the security audit log
    pub fn can_view_audit_log(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patient => write!(f, "patient"),
            Self::Staff => write!(f, "staff"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" | "user" => Ok(Self::Patient),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Identity facts carried by a session and embedded in token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// User ID
    pub id: UserId,
    /// Normalized email address
    pub email: String,
    /// Account role
    pub role: UserRole,
    /// Display name
    pub name: String,
}

impl UserIdentity {
    /// Create an identity, normalizing the email
    pub fn new(id: UserId, email: &str, role: UserRole, name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.trim().to_ascii_lowercase(),
            role,
            name: name.into(),
        }
    }
}
