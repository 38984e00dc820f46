//! Purpose-scoped, time-limited signed tokens.
//!
//! Tokens are stateless HS256 JWTs: validity is determined entirely by the
//! signature and the embedded expiry. The signature covers subject, purpose,
//! role, and expiry, so tampering with any field invalidates the token. A
//! token minted for one purpose is rejected by every consumer expecting
//! another, even when cryptographically valid.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ulid::Ulid;

use super::store::Role;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_EMAIL_VERIFICATION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_PASSWORD_RESET_TTL_SECONDS: i64 = 60 * 60;

/// What a token is allowed to be used for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Session,
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
        }
    }
}

/// Signed claims carried by every token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: uuid::Uuid,
    /// Purpose the token was minted for.
    pub purpose: TokenPurpose,
    /// Role tag, present on session tokens only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Token id (ULID), for audit correlation.
    pub jti: String,
}

/// Per-purpose time-to-live configuration.
#[derive(Clone, Copy, Debug)]
pub struct TokenTtls {
    session: Duration,
    email_verification: Duration,
    password_reset: Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            session: Duration::seconds(DEFAULT_SESSION_TTL_SECONDS),
            email_verification: Duration::seconds(DEFAULT_EMAIL_VERIFICATION_TTL_SECONDS),
            password_reset: Duration::seconds(DEFAULT_PASSWORD_RESET_TTL_SECONDS),
        }
    }
}

impl TokenTtls {
    #[must_use]
    pub fn with_session_seconds(mut self, seconds: i64) -> Self {
        self.session = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_email_verification_seconds(mut self, seconds: i64) -> Self {
        self.email_verification = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_password_reset_seconds(mut self, seconds: i64) -> Self {
        self.password_reset = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn for_purpose(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Session => self.session,
            TokenPurpose::EmailVerification => self.email_verification,
            TokenPurpose::PasswordReset => self.password_reset,
        }
    }
}

/// Opaque token failure.
///
/// Expired, purpose-mismatched, and signature-invalid tokens are
/// indistinguishable to callers; the concrete reason is logged at debug
/// level only, to avoid building an oracle for attackers.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    Invalid,
    #[error("Token signing failed")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// A freshly issued token plus its expiry, for response bodies.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies purpose-scoped tokens with a server-held secret.
pub struct TokenService {
    secret: SecretString,
    ttls: TokenTtls,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: SecretString, ttls: TokenTtls) -> Self {
        Self { secret, ttls }
    }

    /// Generate a random 32-byte secret, base64 url-safe encoded.
    ///
    /// Meant for local development when no secret is configured; tokens
    /// signed with an ephemeral secret do not survive a restart.
    #[must_use]
    pub fn generate_secret() -> SecretString {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes).into()
    }

    /// Issue a token for `subject` scoped to `purpose`.
    ///
    /// # Errors
    /// Returns [`TokenError::Signing`] if encoding fails; callers surface
    /// this as an internal error.
    pub fn issue(
        &self,
        subject: uuid::Uuid,
        purpose: TokenPurpose,
        role: Option<Role>,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, purpose, role, Utc::now())
    }

    /// Like [`TokenService::issue`] with an explicit clock, for tests.
    ///
    /// # Errors
    /// Returns [`TokenError::Signing`] if encoding fails.
    pub fn issue_at(
        &self,
        subject: uuid::Uuid,
        purpose: TokenPurpose,
        role: Option<Role>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = now + self.ttls.for_purpose(purpose);
        let claims = Claims {
            sub: subject,
            purpose,
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Ulid::new().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(TokenError::Signing)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Verify a token and check it was minted for `expected`.
    ///
    /// # Errors
    /// Returns [`TokenError::Invalid`] for every failure mode: bad
    /// signature, expiry, malformed token, or purpose mismatch.
    pub fn verify(&self, token: &str, expected: TokenPurpose) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &validation,
        )
        .map_err(|err| {
            debug!("token verification failed: {err}");
            TokenError::Invalid
        })?;

        if data.claims.purpose != expected {
            debug!(
                expected = expected.as_str(),
                got = data.claims.purpose.as_str(),
                "token purpose mismatch"
            );
            return Err(TokenError::Invalid);
        }

        Ok(data.claims)
    }
}
