//! HTTP surface: router assembly and server loop.

use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

use crate::auth::AuthService;

pub mod handlers;
mod openapi;
#[cfg(test)]
pub(crate) mod test_support;

pub use openapi::ApiDoc;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Build the full application router around one [`AuthService`].
#[must_use]
pub fn router(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/v1/auth/register", post(handlers::auth::register::register))
        .route("/v1/auth/login", post(handlers::auth::login::login))
        .route(
            "/v1/auth/verify-email",
            post(handlers::auth::verification::verify_email),
        )
        .route(
            "/v1/auth/resend-verification",
            post(handlers::auth::verification::resend_verification),
        )
        .route(
            "/v1/auth/forgot-password",
            post(handlers::auth::password_reset::forgot_password),
        )
        .route(
            "/v1/auth/reset-password",
            post(handlers::auth::password_reset::reset_password),
        )
        .route("/v1/auth/session", get(handlers::auth::session::session))
        .route("/v1/auth/admin/unlock", post(handlers::auth::admin::unlock))
        .layer(Extension(service))
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();
    info_span!(
        "http.request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id
    )
}

/// Exact CORS origin for the configured frontend.
fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let url = Url::parse(frontend_base_url).context("invalid frontend base URL")?;
    let origin = url.origin();
    if !matches!(origin, url::Origin::Tuple(..)) {
        return Err(anyhow!("frontend base URL has no usable origin"));
    }
    HeaderValue::from_str(&origin.ascii_serialization())
        .context("frontend origin is not a valid header value")
}

/// Start the server.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server loop fails.
pub async fn serve(port: u16, service: Arc<AuthService>) -> Result<()> {
    let origin = frontend_origin(service.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let app = router(service).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("[::]:{port}")).await?;

    info!("Listening on [::]:{port}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path() {
        let origin = frontend_origin("https://app.gardisto.dev/some/path").expect("parse failed");
        assert_eq!(origin, "https://app.gardisto.dev");
    }

    #[test]
    fn frontend_origin_keeps_port() {
        let origin = frontend_origin("http://localhost:3000").expect("parse failed");
        assert_eq!(origin, "http://localhost:3000");
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
