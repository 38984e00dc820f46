//! Error taxonomy for the auth core and its HTTP mapping.
//!
//! Every rejected request carries a stable machine-readable code plus a
//! human-readable message; no stack traces or internal identifiers reach a
//! response body. Credential failures are normalized to one message
//! regardless of cause, so responses cannot be used to enumerate accounts.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use tracing::error;

use super::rate_limit::RateDecision;
use crate::validation::FieldErrors;

/// Failures surfaced by [`super::service::AuthService`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Client-fixable input problems, one message per field.
    #[error("Invalid input")]
    Validation(FieldErrors),
    /// Bad credentials; deliberately identical for unknown accounts and
    /// wrong passwords.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The account exists but its email is not verified yet.
    #[error("Email verification required")]
    VerificationRequired,
    /// Registration against an already-registered email.
    #[error("An account with this email already exists")]
    EmailExists,
    /// Account is locked out after repeated failures.
    #[error("Account is temporarily locked")]
    AccountLocked { retry_after_seconds: u64 },
    /// Request budget for the window is exhausted.
    #[error("Too many requests")]
    RateLimited { decision: RateDecision },
    /// Invalid, expired, or purpose-mismatched token; callers cannot tell
    /// which.
    #[error("Invalid or expired token")]
    InvalidToken,
    /// Missing or unusable session credentials on an authenticated route.
    #[error("Authentication required")]
    Unauthenticated,
    /// Authenticated but not allowed.
    #[error("Insufficient permissions")]
    Forbidden,
    /// Infrastructure failure that cannot be swallowed (hashing, signing,
    /// persistence).
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code for response bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_input",
            Self::InvalidCredentials => "invalid_credentials",
            Self::VerificationRequired => "email_verification_required",
            Self::EmailExists => "email_exists",
            Self::AccountLocked { .. } => "account_locked",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidToken => "invalid_token",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::Internal(_) => "internal_error",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidToken => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::VerificationRequired | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::EmailExists => StatusCode::CONFLICT,
            Self::AccountLocked { .. } => StatusCode::LOCKED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `X-RateLimit-*` headers for any endpoint behind the limiter.
#[must_use]
pub fn rate_limit_headers(decision: &RateDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        (
            "x-ratelimit-reset",
            decision.reset_at.timestamp().to_string(),
        ),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
    headers
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let mut headers = HeaderMap::new();
        match &self {
            Self::AccountLocked {
                retry_after_seconds,
            } => {
                if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                    headers.insert(RETRY_AFTER, value);
                }
            }
            Self::RateLimited { decision } => {
                headers.extend(rate_limit_headers(decision));
                let retry_after = decision.retry_after_seconds(Utc::now());
                if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                    headers.insert(RETRY_AFTER, value);
                }
            }
            Self::Internal(err) => {
                // Full cause goes to the log, never to the body.
                error!("internal error: {err:#}");
            }
            _ => {}
        }

        let body = match &self {
            Self::Validation(errors) => json!({
                "error": code,
                "message": self.to_string(),
                "fields": errors,
            }),
            _ => json!({
                "error": code,
                "message": self.to_string(),
            }),
        };

        (status, headers, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn codes_and_statuses_are_stable() {
        assert_eq!(AuthError::InvalidCredentials.code(), "invalid_credentials");
        assert_eq!(
            AuthError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::InvalidToken.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::AccountLocked {
                retry_after_seconds: 60
            }
            .status(),
            StatusCode::LOCKED
        );
        assert_eq!(AuthError::EmailExists.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn rate_limited_response_carries_headers() {
        let decision = RateDecision {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_at: Utc::now() + Duration::seconds(90),
        };
        let response = AuthError::RateLimited { decision }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
        assert!(headers.contains_key("x-ratelimit-reset"));
        assert!(headers.contains_key(RETRY_AFTER));
    }

    #[test]
    fn internal_error_body_is_generic() {
        let response = AuthError::Internal(anyhow::anyhow!("pool exhausted at 10.0.0.3")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // Body content is checked end-to-end in tests/auth_flows.rs; here we
        // only pin the status mapping.
    }
}
