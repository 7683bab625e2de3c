//! ClinicBook Audit - security audit log
//!
//! Every security-relevant action (login, logout, lockout, refresh, CSRF
//! failure) produces a [`SecurityEvent`]. The log is append-only, capped at
//! a maximum entry count and a retention window, both enforced on write.
//!
//! Reads support filtering, aggregate statistics and JSON/CSV export for the
//! admin dashboard.

pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod logger;

pub use config::AuditConfig;
pub use error::{AuditError, AuditResult};
pub use event::{Actor, EventEnvironment, SecurityEvent, SecurityEventType, Severity};
pub use export::ExportFormat;
pub use logger::{AuditLogger, AuditQuery, AuditStatistics, RecentActivity};
