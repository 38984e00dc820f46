//! Outbound email abstraction.
//!
//! The orchestrator hands tokens to a [`Mailer`] and moves on: delivery
//! failure is logged and never fails the API call that triggered it. The
//! default sender logs instead of delivering, which is what local dev wants;
//! production implementations deliver via SMTP or an API behind the same
//! trait.

use anyhow::Result;
use std::sync::Mutex;
use tracing::info;

/// Email delivery collaborator, fire-and-forget from the caller's view.
pub trait Mailer: Send + Sync {
    /// # Errors
    /// Returns an error when delivery fails; callers log and continue.
    fn send_verification(&self, email: &str, verify_url: &str) -> Result<()>;
    /// # Errors
    /// Returns an error when delivery fails; callers log and continue.
    fn send_password_reset(&self, email: &str, reset_url: &str) -> Result<()>;
}

/// Local dev sender that logs the link instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_verification(&self, email: &str, verify_url: &str) -> Result<()> {
        info!(to_email = %email, url = %verify_url, "verification email send stub");
        Ok(())
    }

    fn send_password_reset(&self, email: &str, reset_url: &str) -> Result<()> {
        info!(to_email = %email, url = %reset_url, "password reset email send stub");
        Ok(())
    }
}

/// Captures outbound mail for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

#[derive(Clone, Debug)]
pub struct SentMail {
    pub to_email: String,
    pub kind: MailKind,
    pub url: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MailKind {
    Verification,
    PasswordReset,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    fn record(&self, to_email: &str, kind: MailKind, url: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMail {
                to_email: to_email.to_string(),
                kind,
                url: url.to_string(),
            });
        }
    }
}

impl Mailer for RecordingMailer {
    fn send_verification(&self, email: &str, verify_url: &str) -> Result<()> {
        self.record(email, MailKind::Verification, verify_url);
        Ok(())
    }

    fn send_password_reset(&self, email: &str, reset_url: &str) -> Result<()> {
        self.record(email, MailKind::PasswordReset, reset_url);
        Ok(())
    }
}

/// Build the frontend verification link included in outbound emails.
#[must_use]
pub fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email#token={token}")
}

/// Build the frontend password-reset link.
#[must_use]
pub fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password#token={token}")
}
