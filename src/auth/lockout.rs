//! Progressive account lockout.
//!
//! One record per account key (normalized email) tracks consecutive failed
//! authentication attempts. Reaching the attempt limit locks the account;
//! repeated lockout cycles escalate the duration exponentially. Expiry is
//! lazy: no background sweep, the record is repaired on the next read.
//!
//! The failure counter survives lockout expiry so escalation can observe
//! repeated cycles; it returns to zero on success, administrative unlock, or
//! after a long enough gap between failures (stale decay).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use tracing::warn;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_LOCKOUT_MINUTES: i64 = 30;
const DEFAULT_RESET_ATTEMPTS_AFTER_MINUTES: i64 = 60;
// Escalation doubles per cycle; past this many cycles the duration is
// saturated rather than shifted into overflow.
const MAX_ESCALATION_CYCLES: u32 = 16;

/// Lockout thresholds and durations.
#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub base_duration: Duration,
    pub reset_attempts_after: Duration,
    pub escalation: bool,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_duration: Duration::minutes(DEFAULT_BASE_LOCKOUT_MINUTES),
            reset_attempts_after: Duration::minutes(DEFAULT_RESET_ATTEMPTS_AFTER_MINUTES),
            escalation: true,
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_base_duration(mut self, base_duration: Duration) -> Self {
        self.base_duration = base_duration;
        self
    }

    #[must_use]
    pub fn with_reset_attempts_after(mut self, reset_attempts_after: Duration) -> Self {
        self.reset_attempts_after = reset_attempts_after;
        self
    }

    #[must_use]
    pub fn with_escalation(mut self, escalation: bool) -> Self {
        self.escalation = escalation;
        self
    }

    /// Lockout duration for the cycle that `failed_attempts` has reached:
    /// `base × 2^(cycle-1)`, where `cycle = failed_attempts / max_attempts`.
    fn lockout_duration(&self, failed_attempts: u32) -> Duration {
        if !self.escalation {
            return self.base_duration;
        }
        let cycle = (failed_attempts / self.max_attempts).max(1);
        let shift = (cycle - 1).min(MAX_ESCALATION_CYCLES);
        self.base_duration * (1 << shift)
    }
}

/// Persistent failure state for one account key.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LockoutRecord {
    pub failed_attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Observable lockout state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LockoutStatus {
    Unlocked,
    Warning { failed_attempts: u32 },
    Locked { until: DateTime<Utc> },
}

impl LockoutStatus {
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    /// Seconds until the lock expires; zero for unlocked states.
    #[must_use]
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> u64 {
        match self {
            Self::Locked { until } => (*until - now).num_seconds().max(0) as u64,
            _ => 0,
        }
    }

    fn of(record: &LockoutRecord, now: DateTime<Utc>) -> Self {
        match record.locked_until {
            Some(until) if now < until => Self::Locked { until },
            _ if record.failed_attempts > 0 => Self::Warning {
                failed_attempts: record.failed_attempts,
            },
            _ => Self::Unlocked,
        }
    }
}

/// Durable storage for lockout records.
#[async_trait]
pub trait LockoutStore: Send + Sync {
    /// # Errors
    /// Returns an error when the backend is unreachable.
    async fn get(&self, key: &str) -> anyhow::Result<Option<LockoutRecord>>;
    /// # Errors
    /// Returns an error when the backend is unreachable.
    async fn put(&self, key: &str, record: LockoutRecord) -> anyhow::Result<()>;
    /// # Errors
    /// Returns an error when the backend is unreachable.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// In-process store; the default for tests and single-instance dev setups.
#[derive(Debug, Default)]
pub struct InMemoryLockoutStore {
    records: StdMutex<HashMap<String, LockoutRecord>>,
}

impl InMemoryLockoutStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockoutStore for InMemoryLockoutStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<LockoutRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("lockout store poisoned"))?;
        Ok(records.get(key).copied())
    }

    async fn put(&self, key: &str, record: LockoutRecord) -> anyhow::Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("lockout store poisoned"))?;
        records.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("lockout store poisoned"))?;
        records.remove(key);
        Ok(())
    }
}

/// State machine over a [`LockoutStore`], serializing updates per key.
pub struct LockoutTracker {
    store: Arc<dyn LockoutStore>,
    policy: LockoutPolicy,
    fail_open: bool,
    // Read-modify-write sequences for the same account must not interleave;
    // concurrent failures both have to land.
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockoutTracker {
    #[must_use]
    pub fn new(store: Arc<dyn LockoutStore>, policy: LockoutPolicy) -> Self {
        Self {
            store,
            policy,
            fail_open: true,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Treat store failures as locked rather than unlocked.
    #[must_use]
    pub fn with_fail_closed(mut self, fail_closed: bool) -> Self {
        self.fail_open = !fail_closed;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Current status, repairing expired locks and decaying stale failures.
    pub async fn status(&self, key: &str) -> LockoutStatus {
        self.status_at(key, Utc::now()).await
    }

    /// Like [`LockoutTracker::status`] with an explicit clock, for tests.
    pub async fn status_at(&self, key: &str, now: DateTime<Utc>) -> LockoutStatus {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let record = match self.store.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return LockoutStatus::Unlocked,
            Err(err) => return self.degraded("status", key, &err),
        };

        let repaired = Self::repair(record, &self.policy, now);
        if repaired != record
            && let Err(err) = self.store.put(key, repaired).await
        {
            warn!(account = key, "failed to persist lockout repair: {err}");
        }
        LockoutStatus::of(&repaired, now)
    }

    /// Record a failed authentication attempt.
    ///
    /// A no-op while the account is locked. Otherwise the attempt counter is
    /// incremented; crossing a multiple of `max_attempts` locks the account
    /// for the escalated duration.
    pub async fn record_failure(&self, key: &str) -> LockoutStatus {
        self.record_failure_at(key, Utc::now()).await
    }

    /// Like [`LockoutTracker::record_failure`] with an explicit clock.
    pub async fn record_failure_at(&self, key: &str, now: DateTime<Utc>) -> LockoutStatus {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let record = match self.store.get(key).await {
            Ok(record) => record.unwrap_or_default(),
            Err(err) => return self.degraded("record_failure", key, &err),
        };

        let mut record = Self::repair(record, &self.policy, now);
        if let Some(until) = record.locked_until
            && now < until
        {
            // Attempts against a locked account do not extend the lock.
            return LockoutStatus::Locked { until };
        }

        record.failed_attempts += 1;
        record.last_attempt = Some(now);
        if record.failed_attempts % self.policy.max_attempts == 0 {
            record.locked_until =
                Some(now + self.policy.lockout_duration(record.failed_attempts));
        }

        if let Err(err) = self.store.put(key, record).await {
            return self.degraded("record_failure", key, &err);
        }
        LockoutStatus::of(&record, now)
    }

    /// Reset the record after a successful authentication.
    pub async fn record_success(&self, key: &str) {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;
        if let Err(err) = self.store.delete(key).await {
            warn!(account = key, "failed to reset lockout record: {err}");
        }
    }

    /// Administrative unlock: unconditionally clears the record. Audit
    /// logging is the caller's responsibility (it knows the actor).
    pub async fn unlock(&self, key: &str) {
        self.record_success(key).await;
    }

    /// Clear an expired lock and decay failures older than the reset window.
    fn repair(mut record: LockoutRecord, policy: &LockoutPolicy, now: DateTime<Utc>) -> LockoutRecord {
        if let Some(until) = record.locked_until
            && now >= until
        {
            // The counter is kept: escalation spans lockout cycles.
            record.locked_until = None;
        }
        if record.locked_until.is_none()
            && let Some(last) = record.last_attempt
            && now - last >= policy.reset_attempts_after
        {
            record.failed_attempts = 0;
        }
        record
    }

    fn degraded(&self, operation: &str, key: &str, err: &anyhow::Error) -> LockoutStatus {
        warn!(
            account = key,
            operation,
            fail_open = self.fail_open,
            "lockout store unavailable: {err}"
        );
        if self.fail_open {
            LockoutStatus::Unlocked
        } else {
            LockoutStatus::Locked {
                until: Utc::now() + self.policy.base_duration,
            }
        }
    }
}
