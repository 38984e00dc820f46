//! Auth route handlers.
//!
//! Handlers stay thin: guard the payload, call [`AuthService`], map the
//! outcome. All policy (validation order, rate limits, lockout, token
//! purposes) lives in the service.

pub(crate) mod admin;
pub(crate) mod login;
pub(crate) mod password_reset;
pub(crate) mod register;
pub(crate) mod session;
pub(crate) mod types;
pub(crate) mod verification;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use std::sync::Arc;

use crate::auth::{AuthError, AuthService, Principal};

/// Pull a bearer token out of the `Authorization` header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve the calling principal or fail with 401.
pub(crate) async fn require_principal(
    headers: &HeaderMap,
    service: &Arc<AuthService>,
) -> Result<Principal, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::Unauthenticated)?;
    service
        .authenticate(&token)
        .await
        .map_err(|err| match err {
            AuthError::InvalidToken => AuthError::Unauthenticated,
            other => other,
        })
}
