//! OpenAPI document for the auth surface.

use axum::response::Json;
use utoipa::OpenApi;

use super::handlers::{auth, health};
use crate::auth::service::PublicUser;
use crate::auth::store::Role;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "gardisto",
        description = "Authentication and abuse prevention",
        license(name = "BSD-3-Clause")
    ),
    paths(
        health::health,
        auth::register::register,
        auth::login::login,
        auth::verification::verify_email,
        auth::verification::resend_verification,
        auth::password_reset::forgot_password,
        auth::password_reset::reset_password,
        auth::session::session,
        auth::admin::unlock,
    ),
    components(schemas(
        health::Health,
        Role,
        PublicUser,
        auth::types::RegisterRequestBody,
        auth::types::RegisterResponse,
        auth::types::LoginRequestBody,
        auth::types::LoginResponse,
        auth::types::VerifyEmailRequest,
        auth::types::VerifyEmailResponse,
        auth::types::EmailRequestBody,
        auth::types::AcceptedResponse,
        auth::types::ResetPasswordRequest,
        auth::types::SessionResponse,
        auth::types::UnlockRequestBody,
        auth::types::ErrorResponse,
    ))
)]
pub struct ApiDoc;

/// Serve the document at `/openapi.json`.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
