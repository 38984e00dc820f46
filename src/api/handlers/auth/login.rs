//! Login endpoint.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

use super::types::{LoginRequestBody, LoginResponse};
use crate::auth::AuthService;
use crate::auth::error::rate_limit_headers;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequestBody,
    responses(
        (status = 200, description = "Authenticated; session token issued", body = LoginResponse),
        (status = 400, description = "Invalid input", body = super::types::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = super::types::ErrorResponse),
        (status = 403, description = "Email verification required", body = super::types::ErrorResponse),
        (status = 423, description = "Account locked", body = super::types::ErrorResponse),
        (status = 429, description = "Rate limited", body = super::types::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<LoginRequestBody>>,
) -> impl IntoResponse {
    let Some(Json(body)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service.login(&body.email, &body.password).await {
        Ok(logged_in) => {
            let headers = rate_limit_headers(&logged_in.rate);
            let response = LoginResponse {
                user: logged_in.user,
                token: logged_in.token,
                expires_at: logged_in.expires_at,
            };
            (StatusCode::OK, headers, Json(response)).into_response()
        }
        Err(err) => err.into_response(),
    }
}
