//! Audit error types

use clinicbook_store::StoreError;
use thiserror::Error;

/// Errors surfaced by audit reads and exports
///
/// Writes never return these; see [`crate::AuditLogger::log`].
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
