//! End-to-end flows through the orchestrator and the router, on in-memory
//! stores with a recording mailer.

use anyhow::{Context, Result};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header::CONTENT_TYPE};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use gardisto::api;
use gardisto::auth::audit::{AuditEvent, AuditLog, InMemoryAuditLog};
use gardisto::auth::email::{MailKind, Mailer, RecordingMailer};
use gardisto::auth::lockout::{InMemoryLockoutStore, LockoutTracker};
use gardisto::auth::rate_limit::{InMemoryRateStore, RateQuota, RateQuotas};
use gardisto::auth::service::RegisterRequest;
use gardisto::auth::store::InMemoryUserStore;
use gardisto::auth::{
    AuthConfig, AuthService, LockoutPolicy, RateLimiter, RateScope, TokenService, TokenTtls,
};
use gardisto::auth::error::AuthError;

struct Harness {
    service: Arc<AuthService>,
    mailer: Arc<RecordingMailer>,
    audit: Arc<InMemoryAuditLog>,
}

impl Harness {
    /// Generous auth quota so rate limiting does not interfere with flows
    /// that exercise lockout and verification behavior.
    fn new() -> Self {
        Self::with_quotas(
            RateQuotas::default().with_scope(
                RateScope::Authentication,
                RateQuota::new(100, chrono::Duration::minutes(15)),
            ),
        )
    }

    fn with_quotas(quotas: RateQuotas) -> Self {
        let mailer = Arc::new(RecordingMailer::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let service = AuthService::new(
            Arc::new(InMemoryUserStore::new()),
            LockoutTracker::new(
                Arc::new(InMemoryLockoutStore::new()),
                LockoutPolicy::default(),
            ),
            RateLimiter::new(Arc::new(InMemoryRateStore::new()), quotas),
            TokenService::new("integration-secret".into(), TokenTtls::default()),
            Arc::clone(&mailer) as Arc<dyn Mailer>,
            Arc::clone(&audit) as Arc<dyn AuditLog>,
            AuthConfig::new("http://localhost:3000".to_string()),
        );
        Self {
            service: Arc::new(service),
            mailer,
            audit,
        }
    }

    fn router(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }

    async fn register(&self, email: &str, password: &str) -> Result<()> {
        self.service
            .register(RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                password_confirm: password.to_string(),
                display_name: None,
            })
            .await
            .map_err(|err| anyhow::anyhow!("register failed: {err}"))?;
        Ok(())
    }

    fn last_token(&self, kind: MailKind, email: &str) -> Result<String> {
        self.mailer
            .sent()
            .iter()
            .rev()
            .find(|mail| mail.kind == kind && mail.to_email == email)
            .and_then(|mail| mail.url.split("#token=").nth(1).map(str::to_string))
            .context("expected token-bearing email")
    }
}

async fn post_json(router: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request build failed");
    router.oneshot(request).await.expect("request failed")
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read failed")
        .to_vec()
}

#[tokio::test]
async fn full_lifecycle_register_verify_login() -> Result<()> {
    let harness = Harness::new();

    harness.register("alice@example.com", "Password1!").await?;

    // Login before verification: rejected distinctly, and provably not
    // counted as a failed credential attempt (see the four failures below).
    let err = harness
        .service
        .login("alice@example.com", "Password1!")
        .await
        .expect_err("unverified login accepted");
    assert!(matches!(err, AuthError::VerificationRequired));

    // Four real failures; with the unverified attempt miscounted this would
    // be the fifth and the account would lock.
    for _ in 0..4 {
        let err = harness
            .service
            .login("alice@example.com", "WrongPass1!")
            .await
            .expect_err("wrong password accepted");
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    let token = harness.last_token(MailKind::Verification, "alice@example.com")?;
    harness.service.verify_email(&token).await?;

    let logged_in = harness
        .service
        .login("alice@example.com", "Password1!")
        .await
        .map_err(|err| anyhow::anyhow!("verified login failed: {err}"))?;

    // The session token introspects back to the registered subject.
    let principal = harness.service.authenticate(&logged_in.token).await?;
    assert_eq!(principal.user_id, logged_in.user.id);
    assert_eq!(principal.email, "alice@example.com");
    Ok(())
}

#[tokio::test]
async fn login_enumeration_resistance_is_byte_identical() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Password1!").await?;
    let token = harness.last_token(MailKind::Verification, "alice@example.com")?;
    harness.service.verify_email(&token).await?;

    let unknown = post_json(
        harness.router(),
        "/v1/auth/login",
        json!({"email": "ghost@example.com", "password": "Password1!"}),
    )
    .await;
    let wrong = post_json(
        harness.router(),
        "/v1/auth/login",
        json!({"email": "alice@example.com", "password": "WrongPass1!"}),
    )
    .await;

    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_bytes(unknown).await, body_bytes(wrong).await);
    Ok(())
}

#[tokio::test]
async fn verify_email_is_idempotent() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Password1!").await?;
    let token = harness.last_token(MailKind::Verification, "alice@example.com")?;

    let first = harness.service.verify_email(&token).await?;
    assert!(!first.already_verified);
    let second = harness.service.verify_email(&token).await?;
    assert!(second.already_verified);

    // Over HTTP both calls are a plain 200.
    let response = post_json(
        harness.router(),
        "/v1/auth/verify-email",
        json!({"token": token}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn verification_token_is_rejected_by_reset_password() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Password1!").await?;
    let token = harness.last_token(MailKind::Verification, "alice@example.com")?;

    let response = post_json(
        harness.router(),
        "/v1/auth/reset-password",
        json!({
            "token": token,
            "password": "NewPassword1!",
            "password_confirm": "NewPassword1!",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(body["error"], "invalid_token");
    Ok(())
}

#[tokio::test]
async fn password_reset_revokes_existing_sessions() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Password1!").await?;
    let token = harness.last_token(MailKind::Verification, "alice@example.com")?;
    harness.service.verify_email(&token).await?;

    let logged_in = harness
        .service
        .login("alice@example.com", "Password1!")
        .await
        .map_err(|err| anyhow::anyhow!("login failed: {err}"))?;
    assert!(harness.service.authenticate(&logged_in.token).await.is_ok());

    // Tokens carry second-granularity timestamps; make sure the reset cutoff
    // lands strictly after the session's issued-at.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    harness.service.forgot_password("alice@example.com").await?;
    let reset_token = harness.last_token(MailKind::PasswordReset, "alice@example.com")?;
    harness
        .service
        .reset_password(&reset_token, "NewPassword1!", "NewPassword1!")
        .await?;

    // The pre-reset session is dead, the new password works, and a fresh
    // session is accepted.
    let err = harness
        .service
        .authenticate(&logged_in.token)
        .await
        .expect_err("revoked session accepted");
    assert!(matches!(err, AuthError::InvalidToken));

    let err = harness
        .service
        .login("alice@example.com", "Password1!")
        .await
        .expect_err("old password accepted");
    assert!(matches!(err, AuthError::InvalidCredentials));

    let logged_in = harness
        .service
        .login("alice@example.com", "NewPassword1!")
        .await
        .map_err(|err| anyhow::anyhow!("login with new password failed: {err}"))?;
    assert!(harness.service.authenticate(&logged_in.token).await.is_ok());

    let events: Vec<_> = harness
        .audit
        .entries()
        .iter()
        .map(|entry| entry.event)
        .collect();
    assert!(events.contains(&AuditEvent::PasswordReset));
    Ok(())
}

#[tokio::test]
async fn fifth_failure_locks_and_responds_423() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Password1!").await?;
    let token = harness.last_token(MailKind::Verification, "alice@example.com")?;
    harness.service.verify_email(&token).await?;

    for _ in 0..5 {
        let response = post_json(
            harness.router(),
            "/v1/auth/login",
            json!({"email": "alice@example.com", "password": "WrongPass1!"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Even the correct password bounces off the lock.
    let response = post_json(
        harness.router(),
        "/v1/auth/login",
        json!({"email": "alice@example.com", "password": "Password1!"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::LOCKED);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .context("retry-after missing")?;
    assert!(retry_after > 0 && retry_after <= 30 * 60);

    let events: Vec<_> = harness
        .audit
        .entries()
        .iter()
        .map(|entry| entry.event)
        .collect();
    assert!(events.contains(&AuditEvent::AccountLocked));
    Ok(())
}

#[tokio::test]
async fn success_resets_failure_streak() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Password1!").await?;
    let token = harness.last_token(MailKind::Verification, "alice@example.com")?;
    harness.service.verify_email(&token).await?;

    for _ in 0..4 {
        let _ = harness
            .service
            .login("alice@example.com", "WrongPass1!")
            .await;
    }
    harness
        .service
        .login("alice@example.com", "Password1!")
        .await
        .map_err(|err| anyhow::anyhow!("login failed: {err}"))?;

    // One more failure after the success: streak restarted, no lock.
    let err = harness
        .service
        .login("alice@example.com", "WrongPass1!")
        .await
        .expect_err("wrong password accepted");
    assert!(matches!(err, AuthError::InvalidCredentials));
    harness
        .service
        .login("alice@example.com", "Password1!")
        .await
        .map_err(|err| anyhow::anyhow!("login after single failure failed: {err}"))?;
    Ok(())
}

#[tokio::test]
async fn register_rate_limit_returns_429_with_headers() -> Result<()> {
    // Tight authentication quota to trip quickly.
    let harness = Harness::with_quotas(RateQuotas::default().with_scope(
        RateScope::Authentication,
        RateQuota::new(2, chrono::Duration::minutes(15)),
    ));

    let payload = |n: u32| {
        json!({
            "email": "alice@example.com",
            "password": format!("Password{n}!"),
            "password_confirm": format!("Password{n}!"),
        })
    };

    let first = post_json(harness.router(), "/v1/auth/register", payload(1)).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(
        first
            .headers()
            .get("x-ratelimit-limit")
            .and_then(|value| value.to_str().ok()),
        Some("2")
    );

    let second = post_json(harness.router(), "/v1/auth/register", payload(2)).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let third = post_json(harness.router(), "/v1/auth/register", payload(3)).await;
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(third.headers().contains_key("retry-after"));
    assert_eq!(
        third
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok()),
        Some("0")
    );
    Ok(())
}

#[tokio::test]
async fn forgot_password_is_enumeration_safe() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Password1!").await?;

    let known = post_json(
        harness.router(),
        "/v1/auth/forgot-password",
        json!({"email": "alice@example.com"}),
    )
    .await;
    let unknown = post_json(
        harness.router(),
        "/v1/auth/forgot-password",
        json!({"email": "ghost@example.com"}),
    )
    .await;

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(body_bytes(known).await, body_bytes(unknown).await);

    // Only the registered address actually received mail.
    let reset_mail: Vec<_> = harness
        .mailer
        .sent()
        .into_iter()
        .filter(|mail| mail.kind == MailKind::PasswordReset)
        .collect();
    assert_eq!(reset_mail.len(), 1);
    assert_eq!(reset_mail[0].to_email, "alice@example.com");
    Ok(())
}

#[tokio::test]
async fn session_endpoint_resolves_bearer_token() -> Result<()> {
    let harness = Harness::new();
    harness.register("alice@example.com", "Password1!").await?;
    let token = harness.last_token(MailKind::Verification, "alice@example.com")?;
    harness.service.verify_email(&token).await?;
    let logged_in = harness
        .service
        .login("alice@example.com", "Password1!")
        .await
        .map_err(|err| anyhow::anyhow!("login failed: {err}"))?;

    let request = Request::builder()
        .method("GET")
        .uri("/v1/auth/session")
        .header("authorization", format!("Bearer {}", logged_in.token))
        .body(Body::empty())?;
    let response = harness.router().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(body["user"]["email"], "alice@example.com");
    Ok(())
}

#[tokio::test]
async fn admin_unlock_clears_lockout_and_audits_the_actor() -> Result<()> {
    let harness = Harness::new();

    // The victim account locks itself out.
    harness.register("alice@example.com", "Password1!").await?;
    let token = harness.last_token(MailKind::Verification, "alice@example.com")?;
    harness.service.verify_email(&token).await?;
    for _ in 0..5 {
        let _ = harness
            .service
            .login("alice@example.com", "WrongPass1!")
            .await;
    }
    assert!(matches!(
        harness
            .service
            .login("alice@example.com", "Password1!")
            .await,
        Err(AuthError::AccountLocked { .. })
    ));

    // Admin accounts are provisioned out of band; an admin principal is the
    // shape the session middleware would hand the endpoint.
    let admin = gardisto::auth::Principal {
        user_id: uuid::Uuid::new_v4(),
        email: "root@example.com".to_string(),
        role: gardisto::auth::Role::Admin,
    };
    harness
        .service
        .unlock_account("alice@example.com", &admin)
        .await
        .map_err(|err| anyhow::anyhow!("unlock failed: {err}"))?;

    harness
        .service
        .login("alice@example.com", "Password1!")
        .await
        .map_err(|err| anyhow::anyhow!("login after unlock failed: {err}"))?;

    let entries = harness.audit.entries();
    assert!(
        entries
            .iter()
            .any(|entry| entry.event == AuditEvent::AccountUnlocked
                && entry.actor == Some(admin.user_id.to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn unlock_over_http_requires_admin_role() -> Result<()> {
    let harness = Harness::new();
    harness.register("bob@example.com", "Password1!").await?;
    let token = harness.last_token(MailKind::Verification, "bob@example.com")?;
    harness.service.verify_email(&token).await?;
    let logged_in = harness
        .service
        .login("bob@example.com", "Password1!")
        .await
        .map_err(|err| anyhow::anyhow!("login failed: {err}"))?;

    // A regular user's session token gets 403, no token gets 401.
    let request = Request::builder()
        .method("POST")
        .uri("/v1/auth/admin/unlock")
        .header(CONTENT_TYPE, "application/json")
        .header("authorization", format!("Bearer {}", logged_in.token))
        .body(Body::from(json!({"email": "alice@example.com"}).to_string()))?;
    let response = harness.router().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = post_json(
        harness.router(),
        "/v1/auth/admin/unlock",
        json!({"email": "alice@example.com"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
