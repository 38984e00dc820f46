//! Administrative endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::require_principal;
use super::types::UnlockRequestBody;
use crate::auth::AuthService;

/// Clear an account's lockout record. Admin role required; the unlock is
/// written to the audit trail with the acting principal.
#[utoipa::path(
    post,
    path = "/v1/auth/admin/unlock",
    request_body = UnlockRequestBody,
    responses(
        (status = 204, description = "Lockout cleared"),
        (status = 401, description = "Missing or invalid token", body = super::types::ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = super::types::ErrorResponse)
    ),
    tag = "admin"
)]
pub async fn unlock(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<UnlockRequestBody>>,
) -> impl IntoResponse {
    let principal = match require_principal(&headers, &service).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let Some(Json(body)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    match service.unlock_account(&body.email, &principal).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::auth_service;

    #[tokio::test]
    async fn unlock_without_token_is_unauthorized() {
        let (service, _, _) = auth_service();
        let response = unlock(
            HeaderMap::new(),
            Extension(service),
            Some(Json(UnlockRequestBody {
                email: "alice@example.com".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
