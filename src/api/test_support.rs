//! Shared fixtures for handler tests.

use std::sync::Arc;

use crate::auth::audit::{AuditLog, InMemoryAuditLog};
use crate::auth::email::{MailKind, Mailer, RecordingMailer};
use crate::auth::lockout::{InMemoryLockoutStore, LockoutPolicy, LockoutTracker};
use crate::auth::rate_limit::{InMemoryRateStore, RateLimiter, RateQuotas};
use crate::auth::service::RegisterRequest;
use crate::auth::store::InMemoryUserStore;
use crate::auth::token::{TokenService, TokenTtls};
use crate::auth::{AuthConfig, AuthService};

pub(crate) fn auth_service() -> (Arc<AuthService>, Arc<RecordingMailer>, Arc<InMemoryAuditLog>) {
    let mailer = Arc::new(RecordingMailer::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let service = AuthService::new(
        Arc::new(InMemoryUserStore::new()),
        LockoutTracker::new(
            Arc::new(InMemoryLockoutStore::new()),
            LockoutPolicy::default(),
        ),
        RateLimiter::new(Arc::new(InMemoryRateStore::new()), RateQuotas::default()),
        TokenService::new("handler-test-secret".into(), TokenTtls::default()),
        Arc::clone(&mailer) as Arc<dyn Mailer>,
        Arc::clone(&audit) as Arc<dyn AuditLog>,
        AuthConfig::new("http://localhost:3000".to_string()),
    );
    (Arc::new(service), mailer, audit)
}

/// Register an account and return the emailed verification token.
pub(crate) async fn verification_token(
    service: &Arc<AuthService>,
    mailer: &Arc<RecordingMailer>,
    email: &str,
    password: &str,
) -> String {
    service
        .register(RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            password_confirm: password.to_string(),
            display_name: None,
        })
        .await
        .expect("register failed");
    mailer
        .sent()
        .iter()
        .rev()
        .find(|mail| mail.kind == MailKind::Verification && mail.to_email == email)
        .and_then(|mail| mail.url.split("#token=").nth(1).map(str::to_string))
        .expect("verification token missing")
}

/// Register and verify an account so it can log in.
pub(crate) async fn register_verified_user(
    service: &Arc<AuthService>,
    mailer: &Arc<RecordingMailer>,
    email: &str,
    password: &str,
) {
    let token = verification_token(service, mailer, email, password).await;
    service
        .verify_email(&token)
        .await
        .expect("verification failed");
}
