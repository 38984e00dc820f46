//! Password reset endpoints.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

use super::types::{AcceptedResponse, EmailRequestBody, ResetPasswordRequest};
use crate::auth::AuthService;
use crate::auth::error::rate_limit_headers;

/// Start the reset flow. Succeeds whether or not the address is registered.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = EmailRequestBody,
    responses(
        (status = 200, description = "Accepted", body = AcceptedResponse),
        (status = 400, description = "Invalid input", body = super::types::ErrorResponse),
        (status = 429, description = "Rate limited", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<EmailRequestBody>>,
) -> impl IntoResponse {
    let Some(Json(body)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service.forgot_password(&body.email).await {
        Ok(outcome) => (
            StatusCode::OK,
            rate_limit_headers(&outcome.rate),
            Json(AcceptedResponse::ok()),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced; previous sessions revoked", body = AcceptedResponse),
        (status = 400, description = "Invalid token or weak password", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(body)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service
        .reset_password(body.token.trim(), &body.password, &body.password_confirm)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(AcceptedResponse::ok())).into_response(),
        Err(err) => err.into_response(),
    }
}
