//! Auth orchestrator.
//!
//! [`AuthService`] composes the validator, rate limiter, lockout tracker,
//! credential hasher, token service, and collaborators into the
//! register/login/verify/reset flows. It is the only component the request
//! layer talks to. Every dependency is injected, so tests substitute
//! in-memory stubs for all of them.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use super::audit::{AuditEntry, AuditEvent, AuditLog};
use super::email::{Mailer, build_reset_url, build_verify_url};
use super::error::AuthError;
use super::lockout::LockoutTracker;
use super::password::{self, PasswordRequirements};
use super::rate_limit::{RateDecision, RateLimiter, RateScope};
use super::store::{CreateOutcome, NewUser, Role, UserPatch, UserRecord, UserStore};
use super::token::{TokenPurpose, TokenService};
use crate::validation::{EMAIL_REGEX, FieldRules, FieldValues, MAX_EMAIL_LENGTH, Schema};

/// Service-level configuration not owned by a single component.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    default_role: Role,
    password_requirements: PasswordRequirements,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            default_role: Role::User,
            password_requirements: PasswordRequirements::default(),
        }
    }

    #[must_use]
    pub fn with_default_role(mut self, role: Role) -> Self {
        self.default_role = role;
        self
    }

    #[must_use]
    pub fn with_password_requirements(mut self, requirements: PasswordRequirements) -> Self {
        self.password_requirements = requirements;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn password_requirements(&self) -> &PasswordRequirements {
        &self.password_requirements
    }
}

/// Registration input.
#[derive(Clone, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub display_name: Option<String>,
}

/// User shape safe to return to clients. No hash, no internal cutoffs.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl From<UserRecord> for PublicUser {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            role: record.role,
            email_verified: record.email_verified,
            display_name: record.display_name,
        }
    }
}

/// Successful registration; login only becomes possible after verification.
#[derive(Clone, Debug)]
pub struct Registered {
    pub user_id: Uuid,
    pub rate: RateDecision,
}

/// Successful login.
#[derive(Clone, Debug)]
pub struct LoggedIn {
    pub user: PublicUser,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub rate: RateDecision,
}

/// Successful email verification.
#[derive(Clone, Copy, Debug)]
pub struct EmailVerified {
    /// The token was valid but the account was verified already; the call is
    /// an idempotent no-op then.
    pub already_verified: bool,
}

/// Outcome of forgot-password / resend-verification; deliberately identical
/// for known and unknown addresses.
#[derive(Clone, Copy, Debug)]
pub struct ResetRequested {
    pub rate: RateDecision,
}

/// The authenticated caller resolved from a session token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Case-fold an email for lookups and uniqueness.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn field_values(pairs: &[(&str, &str)]) -> FieldValues {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect()
}

fn email_rules() -> FieldRules {
    FieldRules::new()
        .required()
        .max_length(MAX_EMAIL_LENGTH)
        .pattern(&EMAIL_REGEX, "email must be a valid address")
}

fn password_rules(requirements: PasswordRequirements) -> FieldRules {
    FieldRules::new()
        .required()
        .custom(move |value, _| requirements.check(value))
}

fn password_confirm_rules() -> FieldRules {
    FieldRules::new().required().custom(|value, all| {
        (Some(value) != all.get("password").map(String::as_str))
            .then(|| "passwords do not match".to_string())
    })
}

/// The auth orchestrator. See module docs.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    lockouts: LockoutTracker,
    limiter: RateLimiter,
    tokens: TokenService,
    mailer: Arc<dyn Mailer>,
    audit: Arc<dyn AuditLog>,
    config: AuthConfig,
    register_schema: Schema,
    login_schema: Schema,
    email_schema: Schema,
    reset_schema: Schema,
}

impl AuthService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        lockouts: LockoutTracker,
        limiter: RateLimiter,
        tokens: TokenService,
        mailer: Arc<dyn Mailer>,
        audit: Arc<dyn AuditLog>,
        config: AuthConfig,
    ) -> Self {
        let requirements = config.password_requirements;
        let register_schema = Schema::new()
            .field("email", email_rules())
            .field("password", password_rules(requirements))
            .field("password_confirm", password_confirm_rules());
        let login_schema = Schema::new()
            .field("email", email_rules())
            .field("password", FieldRules::new().required());
        let email_schema = Schema::new().field("email", email_rules());
        let reset_schema = Schema::new()
            .field("token", FieldRules::new().required())
            .field("password", password_rules(requirements))
            .field("password_confirm", password_confirm_rules());

        Self {
            users,
            lockouts,
            limiter,
            tokens,
            mailer,
            audit,
            config,
            register_schema,
            login_schema,
            email_schema,
            reset_schema,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn validated(schema: &Schema, values: &FieldValues) -> Result<(), AuthError> {
        let report = schema.validate(values);
        if report.is_valid() {
            Ok(())
        } else {
            Err(AuthError::Validation(report.errors))
        }
    }

    /// Register a new account and send the verification email.
    ///
    /// Never auto-logs-in: the caller gets a "verification required" shape
    /// and the session only exists after `verify_email` + `login`.
    ///
    /// # Errors
    /// `Validation`, `RateLimited`, `EmailExists`, or `Internal`.
    pub async fn register(&self, request: RegisterRequest) -> Result<Registered, AuthError> {
        let email = normalize_email(&request.email);
        let values = field_values(&[
            ("email", &email),
            ("password", &request.password),
            ("password_confirm", &request.password_confirm),
        ]);
        Self::validated(&self.register_schema, &values)?;

        let rate = self.limiter.check(RateScope::Authentication, &email).await;
        if !rate.allowed {
            return Err(AuthError::RateLimited { decision: rate });
        }

        if self
            .users
            .get_by_email(&email)
            .await
            .context("user lookup failed")?
            .is_some()
        {
            return Err(AuthError::EmailExists);
        }

        let password_hash =
            password::hash_password(&request.password).context("password hashing failed")?;
        let user = match self
            .users
            .create(NewUser {
                email,
                password_hash,
                role: self.config.default_role,
                display_name: request.display_name,
            })
            .await
            .context("user creation failed")?
        {
            CreateOutcome::Created(user) => user,
            // Lost the race against a concurrent registration.
            CreateOutcome::Conflict => return Err(AuthError::EmailExists),
        };

        self.send_verification_mail(&user)?;
        self.audit
            .record(AuditEntry::new(AuditEvent::UserRegistered, &user.email));

        Ok(Registered {
            user_id: user.id,
            rate,
        })
    }

    /// Authenticate with email and password, returning a session token.
    ///
    /// Unknown account and wrong password are indistinguishable to the
    /// caller and both count as a failed attempt. An unverified email is
    /// reported distinctly and does not count as a failure.
    ///
    /// # Errors
    /// `Validation`, `AccountLocked`, `RateLimited`, `InvalidCredentials`,
    /// `VerificationRequired`, or `Internal`.
    pub async fn login(&self, email: &str, password_input: &str) -> Result<LoggedIn, AuthError> {
        let email = normalize_email(email);
        let values = field_values(&[("email", &email), ("password", password_input)]);
        Self::validated(&self.login_schema, &values)?;

        let status = self.lockouts.status(&email).await;
        if status.is_locked() {
            return Err(AuthError::AccountLocked {
                retry_after_seconds: status.retry_after_seconds(Utc::now()),
            });
        }

        let rate = self.limiter.check(RateScope::Authentication, &email).await;
        if !rate.allowed {
            return Err(AuthError::RateLimited { decision: rate });
        }

        let user = self
            .users
            .get_by_email(&email)
            .await
            .context("user lookup failed")?;

        let Some(user) = user else {
            // Burn the hashing cost anyway so the not-found path is not
            // observably faster than a wrong password.
            password::verify_dummy(password_input);
            self.note_failed_attempt(&email).await;
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(&user.password_hash, password_input) {
            self.note_failed_attempt(&email).await;
            return Err(AuthError::InvalidCredentials);
        }

        if !user.email_verified {
            // Correct credentials; not an abuse signal.
            return Err(AuthError::VerificationRequired);
        }

        self.lockouts.record_success(&email).await;

        let issued = self
            .tokens
            .issue(user.id, TokenPurpose::Session, Some(user.role))
            .map_err(|err| AuthError::Internal(err.into()))?;

        Ok(LoggedIn {
            user: PublicUser::from(user),
            token: issued.token,
            expires_at: issued.expires_at,
            rate,
        })
    }

    /// Consume an email-verification token and mark the user verified.
    ///
    /// Idempotent: verifying an already-verified account with a still-valid
    /// token succeeds as a no-op.
    ///
    /// # Errors
    /// `InvalidToken` or `Internal`.
    pub async fn verify_email(&self, token: &str) -> Result<EmailVerified, AuthError> {
        let claims = self
            .tokens
            .verify(token, TokenPurpose::EmailVerification)
            .map_err(|_| AuthError::InvalidToken)?;

        let user = self
            .users
            .get_by_id(claims.sub)
            .await
            .context("user lookup failed")?
            .ok_or(AuthError::InvalidToken)?;

        if user.email_verified {
            return Ok(EmailVerified {
                already_verified: true,
            });
        }

        self.users
            .update(
                user.id,
                UserPatch {
                    email_verified: Some(true),
                    ..UserPatch::default()
                },
            )
            .await
            .context("failed to mark user verified")?;
        self.audit
            .record(AuditEntry::new(AuditEvent::EmailVerified, &user.email));

        Ok(EmailVerified {
            already_verified: false,
        })
    }

    /// Re-send the verification email.
    ///
    /// The outcome is identical for unknown addresses and already-verified
    /// accounts, so the endpoint cannot be used to probe for accounts.
    ///
    /// # Errors
    /// `Validation`, `RateLimited`, or `Internal`.
    pub async fn resend_verification(&self, email: &str) -> Result<ResetRequested, AuthError> {
        let email = normalize_email(email);
        let values = field_values(&[("email", &email)]);
        Self::validated(&self.email_schema, &values)?;

        let rate = self.limiter.check(RateScope::PasswordReset, &email).await;
        if !rate.allowed {
            return Err(AuthError::RateLimited { decision: rate });
        }

        let user = self
            .users
            .get_by_email(&email)
            .await
            .context("user lookup failed")?;
        if let Some(user) = user
            && !user.email_verified
        {
            self.send_verification_mail(&user)?;
        }

        Ok(ResetRequested { rate })
    }

    /// Start the password-reset flow.
    ///
    /// Always succeeds for well-formed input, whether or not the address is
    /// registered.
    ///
    /// # Errors
    /// `Validation`, `RateLimited`, or `Internal`.
    pub async fn forgot_password(&self, email: &str) -> Result<ResetRequested, AuthError> {
        let email = normalize_email(email);
        let values = field_values(&[("email", &email)]);
        Self::validated(&self.email_schema, &values)?;

        let rate = self.limiter.check(RateScope::PasswordReset, &email).await;
        if !rate.allowed {
            return Err(AuthError::RateLimited { decision: rate });
        }

        let user = self
            .users
            .get_by_email(&email)
            .await
            .context("user lookup failed")?;
        if let Some(user) = user {
            let issued = self
                .tokens
                .issue(user.id, TokenPurpose::PasswordReset, None)
                .map_err(|err| AuthError::Internal(err.into()))?;
            let url = build_reset_url(self.config.frontend_base_url(), &issued.token);
            if let Err(err) = self.mailer.send_password_reset(&user.email, &url) {
                warn!(account = %user.email, "failed to send password reset email: {err}");
            }
            self.audit.record(AuditEntry::new(
                AuditEvent::PasswordResetRequested,
                &user.email,
            ));
        }

        Ok(ResetRequested { rate })
    }

    /// Consume a password-reset token and set a new password.
    ///
    /// Revokes every previously issued session token by moving the user's
    /// validity cutoff, and clears the account's lockout record.
    ///
    /// # Errors
    /// `InvalidToken`, `Validation`, or `Internal`.
    pub async fn reset_password(
        &self,
        token: &str,
        password_input: &str,
        password_confirm: &str,
    ) -> Result<(), AuthError> {
        let claims = self
            .tokens
            .verify(token, TokenPurpose::PasswordReset)
            .map_err(|_| AuthError::InvalidToken)?;

        let values = field_values(&[
            ("token", token),
            ("password", password_input),
            ("password_confirm", password_confirm),
        ]);
        Self::validated(&self.reset_schema, &values)?;

        let user = self
            .users
            .get_by_id(claims.sub)
            .await
            .context("user lookup failed")?
            .ok_or(AuthError::InvalidToken)?;

        let password_hash =
            password::hash_password(password_input).context("password hashing failed")?;
        self.users
            .update(
                user.id,
                UserPatch {
                    password_hash: Some(password_hash),
                    sessions_invalid_before: Some(Utc::now()),
                    ..UserPatch::default()
                },
            )
            .await
            .context("failed to persist new password")?;

        // A proven reset is a success event for the lockout machine.
        self.lockouts.record_success(&user.email).await;
        self.audit
            .record(AuditEntry::new(AuditEvent::PasswordReset, &user.email));

        Ok(())
    }

    /// Resolve a session token into the calling principal.
    ///
    /// Rejects tokens issued before the user's revocation cutoff (set by
    /// password reset).
    ///
    /// # Errors
    /// `InvalidToken` or `Internal`.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self
            .tokens
            .verify(token, TokenPurpose::Session)
            .map_err(|_| AuthError::InvalidToken)?;

        let user = self
            .users
            .get_by_id(claims.sub)
            .await
            .context("user lookup failed")?
            .ok_or(AuthError::InvalidToken)?;

        if let Some(cutoff) = user.sessions_invalid_before
            && claims.iat < cutoff.timestamp()
        {
            return Err(AuthError::InvalidToken);
        }

        Ok(Principal {
            user_id: user.id,
            email: user.email,
            role: user.role,
        })
    }

    /// Administrative unlock. Admin role required; always audited.
    ///
    /// # Errors
    /// `Forbidden` for non-admin actors.
    pub async fn unlock_account(&self, email: &str, actor: &Principal) -> Result<(), AuthError> {
        if actor.role != Role::Admin {
            return Err(AuthError::Forbidden);
        }
        let email = normalize_email(email);
        self.lockouts.unlock(&email).await;
        self.audit.record(
            AuditEntry::new(AuditEvent::AccountUnlocked, &email)
                .with_actor(actor.user_id.to_string()),
        );
        Ok(())
    }

    /// Liveness of the persistence collaborator, for the health endpoint.
    ///
    /// # Errors
    /// Returns an error when the user store is unreachable.
    pub async fn health(&self) -> anyhow::Result<()> {
        self.users.ping().await
    }

    async fn note_failed_attempt(&self, email: &str) {
        let status = self.lockouts.record_failure(email).await;
        if status.is_locked() {
            // Any lock reported here is fresh: locked accounts bail out
            // before credentials are checked.
            self.audit.record(
                AuditEntry::new(AuditEvent::AccountLocked, email).with_detail(format!(
                    "retry after {}s",
                    status.retry_after_seconds(Utc::now())
                )),
            );
        }
    }

    fn send_verification_mail(&self, user: &UserRecord) -> Result<(), AuthError> {
        let issued = self
            .tokens
            .issue(user.id, TokenPurpose::EmailVerification, None)
            .map_err(|err| AuthError::Internal(err.into()))?;
        let url = build_verify_url(self.config.frontend_base_url(), &issued.token);
        if let Err(err) = self.mailer.send_verification(&user.email, &url) {
            warn!(account = %user.email, "failed to send verification email: {err}");
        }
        Ok(())
    }
}
