//! Session introspection endpoint for bearer tokens.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::require_principal;
use super::types::SessionResponse;
use crate::auth::AuthService;
use crate::auth::service::PublicUser;

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 401, description = "Missing, invalid, or revoked token", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
) -> impl IntoResponse {
    let principal = match require_principal(&headers, &service).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    // Session tokens are only ever issued to verified accounts.
    let user = PublicUser {
        id: principal.user_id,
        email: principal.email,
        role: principal.role,
        email_verified: true,
        display_name: None,
    };
    (StatusCode::OK, Json(SessionResponse { user })).into_response()
}
