//! Security audit logger
//!
//! Append-only store of [`SecurityEvent`]s with count- and age-based
//! eviction on every write. Writes never fail outward: an audit problem must
//! not block the login or logout that triggered it.

use chrono::{DateTime, Duration, Utc};
use clinicbook_store::{keys, StoreError, TypedStore};
use clinicbook_types::{Clock, SecurityEventId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::AuditConfig;
use crate::error::{AuditError, AuditResult};
use crate::event::{Actor, EventEnvironment, SecurityEvent, SecurityEventType, Severity};
use crate::export::{self, ExportFormat};

/// Filter for [`AuditLogger::query`]; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub event_type: Option<SecurityEventType>,
    pub severity: Option<Severity>,
    pub user_id: Option<UserId>,
    pub user_email: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: SecurityEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn user_email(mut self, email: &str) -> Self {
        self.user_email = Some(email.trim().to_ascii_lowercase());
        self
    }

    /// Inclusive time range
    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &SecurityEvent) -> bool {
        self.event_type.map_or(true, |t| event.event_type == t)
            && self.severity.map_or(true, |s| event.severity == s)
            && self
                .user_id
                .as_ref()
                .map_or(true, |id| event.user_id.as_ref() == Some(id))
            && self
                .user_email
                .as_ref()
                .map_or(true, |email| event.user_email.as_deref() == Some(email.as_str()))
            && self.since.map_or(true, |since| event.timestamp >= since)
            && self.until.map_or(true, |until| event.timestamp <= until)
    }
}

/// Event counts over trailing windows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub last_24h: usize,
    pub last_7d: usize,
    pub last_30d: usize,
}

/// Aggregate view of the current log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total_events: usize,
    pub events_by_type: BTreeMap<SecurityEventType, usize>,
    pub events_by_severity: BTreeMap<Severity, usize>,
    pub recent_activity: RecentActivity,
}

/// Persisted, bounded security audit log
#[derive(Clone)]
pub struct AuditLogger {
    store: TypedStore,
    clock: Arc<dyn Clock>,
    config: AuditConfig,
    environment: EventEnvironment,
    /// Serializes read-modify-write cycles within this process
    write_gate: Arc<Mutex<()>>,
}

impl AuditLogger {
    /// Create a logger over a profile-scoped store
    pub fn new(store: TypedStore, clock: Arc<dyn Clock>, config: AuditConfig) -> Self {
        Self {
            store,
            clock,
            config,
            environment: EventEnvironment::default(),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Override the environment stamped on every event
    pub fn with_environment(mut self, environment: EventEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Record an event
    ///
    /// Returns the stored event, or `None` if persisting failed. Failures are
    /// logged and swallowed.
    pub async fn log(
        &self,
        event_type: SecurityEventType,
        severity: Severity,
        details: Value,
        actor: Option<Actor>,
    ) -> Option<SecurityEvent> {
        let actor = actor.unwrap_or_default();
        let details = match details {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        let event = SecurityEvent {
            id: SecurityEventId::new(),
            timestamp: self.clock.now(),
            event_type,
            severity,
            user_id: actor.user_id,
            user_email: actor.email,
            details,
            environment: self.environment.clone(),
        };

        match severity {
            Severity::Critical => tracing::error!(
                event_type = %event.event_type,
                user = event.user_email.as_deref().unwrap_or("-"),
                "Critical security event"
            ),
            Severity::High => tracing::warn!(
                event_type = %event.event_type,
                user = event.user_email.as_deref().unwrap_or("-"),
                "High severity security event"
            ),
            _ => tracing::debug!(event_type = %event.event_type, "Security event"),
        }

        match self.append(event.clone()).await {
            Ok(()) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, event_type = %event.event_type, "Failed to persist audit event");
                None
            }
        }
    }

    async fn append(&self, event: SecurityEvent) -> AuditResult<()> {
        let _guard = self.write_gate.lock().await;

        let mut events = self.load_for_append().await?;
        events.push(event);
        self.evict(&mut events);

        self.store.set(keys::AUDIT_LOG, &events).await?;
        Ok(())
    }

    /// Drop entries past retention, then the oldest beyond the count cap
    fn evict(&self, events: &mut Vec<SecurityEvent>) {
        let retention = Duration::from_std(self.config.retention).unwrap_or_else(|_| Duration::days(90));
        let cutoff = self.clock.now() - retention;
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);

        if events.len() > self.config.max_entries {
            let excess = events.len() - self.config.max_entries;
            events.drain(..excess);
        }

        let evicted = before - events.len();
        if evicted > 0 {
            tracing::debug!(evicted, retained = events.len(), "Evicted audit events");
        }
    }

    /// Remove every stored event
    pub async fn clear(&self) -> AuditResult<()> {
        let _guard = self.write_gate.lock().await;
        self.store.delete(keys::AUDIT_LOG).await?;
        tracing::info!("Audit log cleared");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All stored events in append order (oldest first)
    pub async fn all(&self) -> AuditResult<Vec<SecurityEvent>> {
        Ok(self.store.get_or_default(keys::AUDIT_LOG).await?)
    }

    /// A corrupt log must not wedge the writer; start over instead. Any
    /// other read failure aborts the append so stored history is kept.
    async fn load_for_append(&self) -> AuditResult<Vec<SecurityEvent>> {
        match self.all().await {
            Ok(events) => Ok(events),
            Err(AuditError::Store(StoreError::Serialization(e))) => {
                tracing::warn!(error = %e, "Audit log unreadable, starting a new one");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Matching events, newest first
    pub async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<SecurityEvent>> {
        let mut events: Vec<SecurityEvent> = self
            .all()
            .await?
            .into_iter()
            .rev()
            .filter(|e| query.matches(e))
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    pub async fn events_by_type(&self, event_type: SecurityEventType) -> AuditResult<Vec<SecurityEvent>> {
        self.query(&AuditQuery::new().event_type(event_type)).await
    }

    pub async fn events_by_severity(&self, severity: Severity) -> AuditResult<Vec<SecurityEvent>> {
        self.query(&AuditQuery::new().severity(severity)).await
    }

    pub async fn events_by_user(&self, user_id: UserId) -> AuditResult<Vec<SecurityEvent>> {
        self.query(&AuditQuery::new().user_id(user_id)).await
    }

    pub async fn events_in_range(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AuditResult<Vec<SecurityEvent>> {
        self.query(&AuditQuery::new().between(since, until)).await
    }

    /// The `limit` most recent events
    pub async fn recent(&self, limit: usize) -> AuditResult<Vec<SecurityEvent>> {
        self.query(&AuditQuery::new().limit(limit)).await
    }

    /// Full-scan statistics over the current log
    pub async fn statistics(&self) -> AuditResult<AuditStatistics> {
        let events = self.all().await?;
        let now = self.clock.now();
        let mut stats = AuditStatistics {
            total_events: events.len(),
            ..Default::default()
        };

        for event in &events {
            *stats.events_by_type.entry(event.event_type).or_default() += 1;
            *stats.events_by_severity.entry(event.severity).or_default() += 1;

            let age = now - event.timestamp;
            if age <= Duration::hours(24) {
                stats.recent_activity.last_24h += 1;
            }
            if age <= Duration::days(7) {
                stats.recent_activity.last_7d += 1;
            }
            if age <= Duration::days(30) {
                stats.recent_activity.last_30d += 1;
            }
        }

        Ok(stats)
    }

    /// Render the whole log, newest first
    pub async fn export(&self, format: ExportFormat) -> AuditResult<String> {
        let events = self.query(&AuditQuery::new()).await?;
        export::render(&events, format)
    }
}
