//! Login Rate Limiter
//!
//! Failed-login tracking with lockout, persisted in the profile store so a
//! reload does not reset the counter.
//!
//! Per identifier the entry moves through:
//! - Clean: no entry
//! - Warned: `1..max_attempts` failures recorded
//! - Locked: `count >= max_attempts`, `locked_until` frozen
//!
//! and returns to Clean on a successful login, when the lockout elapses, or
//! when no attempt was made for longer than the reset window. Stale entries
//! are collected opportunistically on every check; there is no timer.

use chrono::{DateTime, Utc};
use clinicbook_store::{keys, StoreError, TypedStore};
use clinicbook_types::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::{to_chrono, RateLimitConfig};
use crate::error::{AuthError, AuthResult};

/// Failed-attempt record for one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptEntry {
    pub count: u32,
    pub last_attempt: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

type AttemptTable = BTreeMap<String, AttemptEntry>;

/// Answer to "may this identifier try to log in now?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptDecision {
    pub allowed: bool,
    /// Time left on the lockout when not allowed
    pub remaining_time: Option<Duration>,
    pub remaining_attempts: u32,
}

/// Result of recording one failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureOutcome {
    pub attempts: u32,
    pub remaining_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    /// This failure is the one that triggered the lockout
    pub just_locked: bool,
}

/// Normalize an identifier (email) for use as a table key
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Login lockout service
#[derive(Clone)]
pub struct LoginRateLimiter {
    store: TypedStore,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    /// Serializes read-modify-write cycles on the attempt table
    gate: Arc<Mutex<()>>,
}

impl LoginRateLimiter {
    /// Create a new limiter over the profile-scoped store
    pub fn new(store: TypedStore, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            config,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check whether an attempt is allowed, freezing a pending lockout
    pub async fn can_attempt(&self, identifier: &str) -> AuthResult<AttemptDecision> {
        let key = normalize_identifier(identifier);
        let _guard = self.gate.lock().await;
        let now = self.clock.now();

        let mut table = self.load().await?;
        let mut dirty = self.collect_stale(&mut table, now)?;

        let decision = match table.get_mut(&key) {
            None => AttemptDecision {
                allowed: true,
                remaining_time: None,
                remaining_attempts: self.config.max_attempts,
            },
            Some(entry) => {
                if entry.count >= self.config.max_attempts && entry.locked_until.is_none() {
                    entry.locked_until = Some(now + to_chrono(self.config.lockout_duration)?);
                    dirty = true;
                }

                match entry.locked_until {
                    Some(until) if now < until => AttemptDecision {
                        allowed: false,
                        remaining_time: Some((until - now).to_std().unwrap_or(Duration::ZERO)),
                        remaining_attempts: 0,
                    },
                    _ => AttemptDecision {
                        allowed: true,
                        remaining_time: None,
                        remaining_attempts: self.config.max_attempts.saturating_sub(entry.count),
                    },
                }
            }
        };

        if dirty {
            self.save(&table).await?;
        }

        Ok(decision)
    }

    /// Record a failed attempt, locking the identifier at the threshold
    pub async fn record_failure(&self, identifier: &str) -> AuthResult<FailureOutcome> {
        let key = normalize_identifier(identifier);
        let _guard = self.gate.lock().await;
        let now = self.clock.now();

        let mut table = self.load().await?;
        self.collect_stale(&mut table, now)?;

        let entry = table.entry(key.clone()).or_insert(AttemptEntry {
            count: 0,
            last_attempt: now,
            locked_until: None,
        });
        entry.count = entry.count.saturating_add(1);
        entry.last_attempt = now;

        let mut just_locked = false;
        if entry.count >= self.config.max_attempts && entry.locked_until.is_none() {
            entry.locked_until = Some(now + to_chrono(self.config.lockout_duration)?);
            just_locked = true;

            tracing::warn!(
                identifier = %key,
                attempts = entry.count,
                lockout_seconds = self.config.lockout_duration.as_secs(),
                "Account locked due to failed login attempts"
            );
        }

        let outcome = FailureOutcome {
            attempts: entry.count,
            remaining_attempts: self.config.max_attempts.saturating_sub(entry.count),
            locked_until: entry.locked_until,
            just_locked,
        };

        self.save(&table).await?;
        Ok(outcome)
    }

    /// Record a successful login (forget failed attempts)
    pub async fn record_success(&self, identifier: &str) -> AuthResult<()> {
        self.reset(identifier).await.map(|_| ())
    }

    /// Attempts left before lockout, floored at zero
    pub async fn remaining_attempts(&self, identifier: &str) -> AuthResult<u32> {
        let now = self.clock.now();
        let table = self.load().await?;

        match table.get(&normalize_identifier(identifier)) {
            Some(entry) if !self.is_stale(entry, now)? => {
                Ok(self.config.max_attempts.saturating_sub(entry.count))
            }
            _ => Ok(self.config.max_attempts),
        }
    }

    /// Time left on an active lockout
    pub async fn is_locked_out(&self, identifier: &str) -> AuthResult<Option<Duration>> {
        let now = self.clock.now();
        let table = self.load().await?;

        Ok(table
            .get(&normalize_identifier(identifier))
            .and_then(|entry| entry.locked_until)
            .filter(|until| now < *until)
            .map(|until| (until - now).to_std().unwrap_or(Duration::ZERO)))
    }

    /// Fail with `RateLimited` when the identifier may not try now
    ///
    /// For throttling callers other than login, which report lockouts itself.
    pub async fn enforce(&self, identifier: &str) -> AuthResult<()> {
        let decision = self.can_attempt(identifier).await?;
        if decision.allowed {
            Ok(())
        } else {
            Err(AuthError::rate_limited(decision.remaining_time.unwrap_or(Duration::ZERO)))
        }
    }

    /// Drop the entry for an identifier (admin unlock); true if one existed
    pub async fn reset(&self, identifier: &str) -> AuthResult<bool> {
        let key = normalize_identifier(identifier);
        let _guard = self.gate.lock().await;

        let mut table = self.load().await?;
        let removed = table.remove(&key).is_some();
        if removed {
            self.save(&table).await?;
        }
        Ok(removed)
    }

    /// Remove every stale entry; returns the number removed
    pub async fn cleanup(&self) -> AuthResult<usize> {
        let _guard = self.gate.lock().await;
        let now = self.clock.now();

        let mut table = self.load().await?;
        let before = table.len();
        if self.collect_stale(&mut table, now)? {
            self.save(&table).await?;
        }
        Ok(before - table.len())
    }

    /// Snapshot of the entry for an identifier
    pub async fn entry(&self, identifier: &str) -> AuthResult<Option<AttemptEntry>> {
        Ok(self.load().await?.remove(&normalize_identifier(identifier)))
    }

    fn is_stale(&self, entry: &AttemptEntry, now: DateTime<Utc>) -> AuthResult<bool> {
        Ok(match entry.locked_until {
            Some(until) => now >= until,
            None => now - entry.last_attempt > to_chrono(self.config.reset_window)?,
        })
    }

    fn collect_stale(&self, table: &mut AttemptTable, now: DateTime<Utc>) -> AuthResult<bool> {
        let mut stale = Vec::new();
        for (key, entry) in table.iter() {
            if self.is_stale(entry, now)? {
                stale.push(key.clone());
            }
        }
        for key in &stale {
            table.remove(key);
        }
        if !stale.is_empty() {
            tracing::debug!(removed = stale.len(), "Collected stale login attempt entries");
        }
        Ok(!stale.is_empty())
    }

    /// A corrupt table is discarded; a failed read is an error, so the
    /// caller fails closed and never writes over live lockouts
    async fn load(&self) -> AuthResult<AttemptTable> {
        match self.store.get_or_default::<AttemptTable>(keys::LOGIN_ATTEMPTS).await {
            Ok(table) => Ok(table),
            Err(StoreError::Serialization(e)) => {
                tracing::warn!(error = %e, "Discarding unreadable login attempt table");
                Ok(AttemptTable::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, table: &AttemptTable) -> AuthResult<()> {
        if table.is_empty() {
            self.store.delete(keys::LOGIN_ATTEMPTS).await?;
        } else {
            self.store.set(keys::LOGIN_ATTEMPTS, table).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinicbook_store::testing::FaultyStore;
    use clinicbook_store::MemoryStore;
    use clinicbook_types::ManualClock;

    const EMAIL: &str = "patient@clinic.example";
    const OTHER: &str = "other@clinic.example";

    fn limiter() -> (LoginRateLimiter, ManualClock, TypedStore) {
        let clock = ManualClock::starting_now();
        let store = TypedStore::new(Arc::new(MemoryStore::profile()));
        let limiter = LoginRateLimiter::new(store.clone(), Arc::new(clock.clone()), RateLimitConfig::default());
        (limiter, clock, store)
    }

    #[tokio::test]
    async fn test_fresh_identifier_is_allowed() {
        let (limiter, _, _) = limiter();
        let decision = limiter.can_attempt(EMAIL).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 5);
        assert_eq!(decision.remaining_time, None);
    }

    #[tokio::test]
    async fn test_warned_then_locked_at_threshold() {
        let (limiter, _, _) = limiter();

        for expected_remaining in (1..5).rev() {
            let outcome = limiter.record_failure(EMAIL).await.unwrap();
            assert_eq!(outcome.remaining_attempts, expected_remaining);
            assert!(!outcome.just_locked);
            assert!(limiter.can_attempt(EMAIL).await.unwrap().allowed);
        }

        let outcome = limiter.record_failure(EMAIL).await.unwrap();
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.remaining_attempts, 0);
        assert!(outcome.just_locked);

        let decision = limiter.can_attempt(EMAIL).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining_attempts, 0);
        assert_eq!(decision.remaining_time, Some(Duration::from_secs(15 * 60)));
    }

    #[tokio::test]
    async fn test_lockout_expires() {
        let (limiter, clock, _) = limiter();
        for _ in 0..5 {
            limiter.record_failure(EMAIL).await.unwrap();
        }

        clock.advance(chrono::Duration::minutes(15) - chrono::Duration::seconds(1));
        assert!(!limiter.can_attempt(EMAIL).await.unwrap().allowed);

        clock.advance(chrono::Duration::seconds(1));
        let decision = limiter.can_attempt(EMAIL).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 5);
        assert!(limiter.entry(EMAIL).await.unwrap().is_none());

        // Counting restarts after the lockout
        let outcome = limiter.record_failure(EMAIL).await.unwrap();
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_success_resets_count() {
        let (limiter, _, _) = limiter();
        for _ in 0..3 {
            limiter.record_failure(EMAIL).await.unwrap();
        }
        assert_eq!(limiter.remaining_attempts(EMAIL).await.unwrap(), 2);

        limiter.record_success(EMAIL).await.unwrap();

        assert_eq!(limiter.remaining_attempts(EMAIL).await.unwrap(), 5);
        assert!(limiter.entry(EMAIL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_window_forgets_failures() {
        let (limiter, clock, _) = limiter();
        for _ in 0..4 {
            limiter.record_failure(EMAIL).await.unwrap();
        }

        clock.advance(chrono::Duration::minutes(61));

        assert_eq!(limiter.remaining_attempts(EMAIL).await.unwrap(), 5);
        let outcome = limiter.record_failure(EMAIL).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.just_locked);
    }

    #[tokio::test]
    async fn test_identifier_is_normalized() {
        let (limiter, _, _) = limiter();
        limiter.record_failure("  Patient@Clinic.Example ").await.unwrap();
        assert_eq!(limiter.remaining_attempts(EMAIL).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_pending_lockout_is_frozen_on_check() {
        let (limiter, clock, store) = limiter();
        let mut table = AttemptTable::new();
        table.insert(
            EMAIL.to_string(),
            AttemptEntry {
                count: 7,
                last_attempt: clock.now(),
                locked_until: None,
            },
        );
        store.set(keys::LOGIN_ATTEMPTS, &table).await.unwrap();

        let decision = limiter.can_attempt(EMAIL).await.unwrap();
        assert!(!decision.allowed);

        let entry = limiter.entry(EMAIL).await.unwrap().unwrap();
        assert_eq!(entry.locked_until, Some(clock.now() + chrono::Duration::minutes(15)));
    }

    #[tokio::test]
    async fn test_enforce_reports_rate_limited() {
        let (limiter, _, _) = limiter();
        assert!(limiter.enforce(EMAIL).await.is_ok());

        for _ in 0..5 {
            limiter.record_failure(EMAIL).await.unwrap();
        }

        let err = limiter.enforce(EMAIL).await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { retry_after_ms: 900_000 }));
    }

    #[tokio::test]
    async fn test_reset_and_cleanup() {
        let (limiter, clock, _) = limiter();
        for _ in 0..5 {
            limiter.record_failure(EMAIL).await.unwrap();
        }
        limiter.record_failure(OTHER).await.unwrap();

        assert!(limiter.is_locked_out(EMAIL).await.unwrap().is_some());
        assert!(limiter.reset(EMAIL).await.unwrap());
        assert!(!limiter.reset(EMAIL).await.unwrap());
        assert!(limiter.is_locked_out(EMAIL).await.unwrap().is_none());

        clock.advance(chrono::Duration::hours(2));
        assert_eq!(limiter.cleanup().await.unwrap(), 1);
        assert_eq!(limiter.cleanup().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_table_is_discarded() {
        let (limiter, _, store) = limiter();
        store.set_string(keys::LOGIN_ATTEMPTS, "[not a table").await.unwrap();

        assert!(limiter.can_attempt(EMAIL).await.unwrap().allowed);
        let outcome = limiter.record_failure(EMAIL).await.unwrap();
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_existing_lockouts() {
        let clock = ManualClock::starting_now();
        let backend = FaultyStore::new(MemoryStore::profile());
        let limiter = LoginRateLimiter::new(
            TypedStore::new(Arc::new(backend.clone())),
            Arc::new(clock.clone()),
            RateLimitConfig::default(),
        );
        for _ in 0..5 {
            limiter.record_failure(EMAIL).await.unwrap();
        }

        backend.fail_reads(true);
        assert!(matches!(limiter.can_attempt(EMAIL).await, Err(AuthError::Store(_))));
        assert!(limiter.record_failure(OTHER).await.is_err());
        assert!(limiter.reset(EMAIL).await.is_err());
        assert!(limiter.cleanup().await.is_err());

        backend.fail_reads(false);
        let decision = limiter.can_attempt(EMAIL).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(limiter.entry(EMAIL).await.unwrap().unwrap().count, 5);
        assert!(limiter.entry(OTHER).await.unwrap().is_none());
    }
}
