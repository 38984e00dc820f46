//! Server action: wire up stores and start the API.

use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api;
use crate::auth::audit::TracingAuditLog;
use crate::auth::email::LogMailer;
use crate::auth::lockout::{InMemoryLockoutStore, LockoutPolicy, LockoutStore, LockoutTracker};
use crate::auth::postgres::{PgLockoutStore, PgUserStore};
use crate::auth::rate_limit::{InMemoryRateStore, RateLimiter, RateQuotas};
use crate::auth::store::{InMemoryUserStore, UserStore};
use crate::auth::token::{TokenService, TokenTtls};
use crate::auth::{AuthConfig, AuthService};
use crate::cli::telemetry;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub token_secret: Option<String>,
    pub frontend_url: String,
    pub fail_closed: bool,
}

/// Start the server with the configured stores.
///
/// # Errors
/// Returns an error if the database is unreachable or the listener fails.
pub async fn execute(args: Args) -> Result<()> {
    let secret: SecretString = match args.token_secret {
        Some(secret) => secret.into(),
        None => {
            warn!("no token secret configured; using an ephemeral secret (tokens die on restart)");
            TokenService::generate_secret()
        }
    };
    let tokens = TokenService::new(secret, TokenTtls::default());

    let (users, lockout_store): (Arc<dyn UserStore>, Arc<dyn LockoutStore>) = match &args.dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;
            (
                Arc::new(PgUserStore::new(pool.clone())),
                Arc::new(PgLockoutStore::new(pool)),
            )
        }
        None => {
            warn!("no DSN configured; user and lockout state is in-memory only");
            (
                Arc::new(InMemoryUserStore::new()),
                Arc::new(InMemoryLockoutStore::new()),
            )
        }
    };

    let lockouts = LockoutTracker::new(lockout_store, LockoutPolicy::default())
        .with_fail_closed(args.fail_closed);
    // Rate windows are ephemeral by contract; loss on restart fails open.
    let limiter = RateLimiter::new(Arc::new(InMemoryRateStore::new()), RateQuotas::default())
        .with_fail_closed(args.fail_closed);

    let service = AuthService::new(
        users,
        lockouts,
        limiter,
        tokens,
        Arc::new(LogMailer),
        Arc::new(TracingAuditLog),
        AuthConfig::new(args.frontend_url),
    );

    info!(fail_closed = args.fail_closed, "starting gardisto");
    let result = api::serve(args.port, Arc::new(service)).await;
    telemetry::shutdown_tracer();
    result
}
