//! Audit log configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds applied to the persisted audit log on every write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Maximum number of retained events (oldest dropped first)
    pub max_entries: usize,
    /// Events older than this are purged
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            retention: Duration::from_secs(90 * 24 * 60 * 60), // 90 days
        }
    }
}
