//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::service::PublicUser;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequestBody {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub user_id: String,
    pub requires_email_verification: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequestBody {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    pub user: PublicUser,
    /// Session token; purpose-scoped, expires per configuration.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailResponse {
    pub verified: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailRequestBody {
    pub email: String,
}

/// Deliberately shapeless acknowledgement for enumeration-safe endpoints.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AcceptedResponse {
    pub status: String,
}

impl AcceptedResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SessionResponse {
    pub user: PublicUser,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UnlockRequestBody {
    pub email: String,
}

/// Error body shape used by every rejection.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn register_request_round_trips() -> Result<()> {
        let body: RegisterRequestBody = serde_json::from_value(serde_json::json!({
            "email": "alice@example.com",
            "password": "Password1!",
            "password_confirm": "Password1!",
        }))?;
        assert_eq!(body.email, "alice@example.com");
        assert!(body.display_name.is_none());
        Ok(())
    }

    #[test]
    fn accepted_response_is_stable() -> Result<()> {
        let value = serde_json::to_value(AcceptedResponse::ok())?;
        assert_eq!(value, serde_json::json!({"status": "ok"}));
        Ok(())
    }
}
