//! Registration endpoint.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

use super::types::{RegisterRequestBody, RegisterResponse};
use crate::auth::error::rate_limit_headers;
use crate::auth::service::RegisterRequest;
use crate::auth::AuthService;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequestBody,
    responses(
        (status = 201, description = "Account created; verification email sent", body = RegisterResponse),
        (status = 400, description = "Invalid input", body = super::types::ErrorResponse),
        (status = 409, description = "Email already registered", body = super::types::ErrorResponse),
        (status = 429, description = "Rate limited", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<RegisterRequestBody>>,
) -> impl IntoResponse {
    let Some(Json(body)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let request = RegisterRequest {
        email: body.email,
        password: body.password,
        password_confirm: body.password_confirm,
        display_name: body.display_name,
    };

    match service.register(request).await {
        Ok(registered) => {
            let response = RegisterResponse {
                user_id: registered.user_id.to_string(),
                requires_email_verification: true,
            };
            (
                StatusCode::CREATED,
                rate_limit_headers(&registered.rate),
                Json(response),
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}
