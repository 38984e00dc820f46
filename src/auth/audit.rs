//! Audit trail for security-relevant events.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::info;

/// Events worth an audit entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuditEvent {
    UserRegistered,
    EmailVerified,
    AccountLocked,
    AccountUnlocked,
    PasswordResetRequested,
    PasswordReset,
}

impl AuditEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserRegistered => "user_registered",
            Self::EmailVerified => "email_verified",
            Self::AccountLocked => "account_locked",
            Self::AccountUnlocked => "account_unlocked",
            Self::PasswordResetRequested => "password_reset_requested",
            Self::PasswordReset => "password_reset",
        }
    }
}

/// One audit entry. `actor` is the acting principal for administrative
/// operations, `None` for self-service flows.
#[derive(Clone, Debug)]
pub struct AuditEntry {
    pub event: AuditEvent,
    pub actor: Option<String>,
    pub account: String,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(event: AuditEvent, account: impl Into<String>) -> Self {
        Self {
            event,
            actor: None,
            account: account.into(),
            detail: None,
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Audit sink. Recording must never fail the operation being audited.
pub trait AuditLog: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Default sink: structured log lines, picked up by whatever ships logs.
#[derive(Clone, Debug)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, entry: AuditEntry) {
        info!(
            event = entry.event.as_str(),
            actor = entry.actor.as_deref().unwrap_or("-"),
            account = %entry.account,
            detail = entry.detail.as_deref().unwrap_or("-"),
            at = %entry.at,
            "audit"
        );
    }
}

/// Captures entries for assertions in tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}
