//! Email verification endpoints.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

use super::types::{AcceptedResponse, EmailRequestBody, VerifyEmailRequest, VerifyEmailResponse};
use crate::auth::AuthService;
use crate::auth::error::rate_limit_headers;

#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = VerifyEmailResponse),
        (status = 400, description = "Invalid or expired token", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(body)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service.verify_email(body.token.trim()).await {
        Ok(_) => (StatusCode::OK, Json(VerifyEmailResponse { verified: true })).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Re-send a verification email. Response shape is identical whether or not
/// the address is registered.
#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = EmailRequestBody,
    responses(
        (status = 200, description = "Accepted", body = AcceptedResponse),
        (status = 400, description = "Invalid input", body = super::types::ErrorResponse),
        (status = 429, description = "Rate limited", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<EmailRequestBody>>,
) -> impl IntoResponse {
    let Some(Json(body)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service.resend_verification(&body.email).await {
        Ok(outcome) => (
            StatusCode::OK,
            rate_limit_headers(&outcome.rate),
            Json(AcceptedResponse::ok()),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
