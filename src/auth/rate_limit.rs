//! Fixed-window request rate limiting.
//!
//! Windows are keyed by `(identifier, scope)` and reset at discrete
//! boundaries: a window is replaced, never carried over, once its reset time
//! passes. A burst straddling the boundary can therefore admit up to twice
//! the limit; that trade-off is part of the observable contract and must not
//! be silently upgraded to sliding-window semantics.
//!
//! The counter store is a trait so a shared backend (e.g. an external atomic
//! counter service) can replace the in-process map in multi-instance
//! deployments without touching limiter logic.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Scopes with independent quotas.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RateScope {
    Authentication,
    PasswordReset,
    Api,
    Payment,
}

impl RateScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::PasswordReset => "password_reset",
            Self::Api => "api",
            Self::Payment => "payment",
        }
    }
}

/// Per-scope quota: how many requests fit in one window.
#[derive(Clone, Copy, Debug)]
pub struct RateQuota {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateQuota {
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Quotas for every scope. Defaults preserve the documented limits.
#[derive(Clone, Copy, Debug)]
pub struct RateQuotas {
    authentication: RateQuota,
    password_reset: RateQuota,
    api: RateQuota,
    payment: RateQuota,
}

impl Default for RateQuotas {
    fn default() -> Self {
        Self {
            authentication: RateQuota::new(5, Duration::minutes(15)),
            password_reset: RateQuota::new(3, Duration::minutes(60)),
            api: RateQuota::new(100, Duration::minutes(15)),
            payment: RateQuota::new(10, Duration::minutes(10)),
        }
    }
}

impl RateQuotas {
    #[must_use]
    pub fn with_scope(mut self, scope: RateScope, quota: RateQuota) -> Self {
        match scope {
            RateScope::Authentication => self.authentication = quota,
            RateScope::PasswordReset => self.password_reset = quota,
            RateScope::Api => self.api = quota,
            RateScope::Payment => self.payment = quota,
        }
        self
    }

    #[must_use]
    pub fn for_scope(&self, scope: RateScope) -> RateQuota {
        match scope {
            RateScope::Authentication => self.authentication,
            RateScope::PasswordReset => self.password_reset,
            RateScope::Api => self.api,
            RateScope::Payment => self.payment,
        }
    }
}

/// Outcome of one rate-limit check, also used to populate the
/// `X-RateLimit-*` response headers.
#[derive(Clone, Copy, Debug)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    /// Seconds until the window resets, floored at zero.
    #[must_use]
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> u64 {
        (self.reset_at - now).num_seconds().max(0) as u64
    }
}

/// Atomic counter backend for one `(identifier, scope)` window.
#[async_trait]
pub trait RateWindowStore: Send + Sync {
    /// Record one request against `key` and return the resulting decision.
    ///
    /// The read-increment-write must be atomic per key: two concurrent hits
    /// must both be counted. Saturated windows are reported, not incremented,
    /// so the stored count never exceeds the quota.
    ///
    /// # Errors
    /// Returns an error when the backend is unreachable; the limiter maps
    /// that onto the configured fail policy.
    async fn hit(
        &self,
        key: &str,
        quota: RateQuota,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RateDecision>;
}

#[derive(Clone, Copy, Debug)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// In-process window store. Counters reset on restart, which fails open.
#[derive(Debug, Default)]
pub struct InMemoryRateStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryRateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateWindowStore for InMemoryRateStore {
    async fn hit(
        &self,
        key: &str,
        quota: RateQuota,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RateDecision> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| anyhow::anyhow!("rate window store poisoned"))?;

        let window = windows.get(key).copied();
        let decision = match window {
            // Expired or absent: start a fresh window with this request.
            None => {
                let fresh = Window {
                    count: 1,
                    reset_at: now + quota.window,
                };
                windows.insert(key.to_string(), fresh);
                RateDecision {
                    allowed: true,
                    limit: quota.max_requests,
                    remaining: quota.max_requests.saturating_sub(1),
                    reset_at: fresh.reset_at,
                }
            }
            Some(window) if now > window.reset_at => {
                let fresh = Window {
                    count: 1,
                    reset_at: now + quota.window,
                };
                windows.insert(key.to_string(), fresh);
                RateDecision {
                    allowed: true,
                    limit: quota.max_requests,
                    remaining: quota.max_requests.saturating_sub(1),
                    reset_at: fresh.reset_at,
                }
            }
            Some(window) if window.count >= quota.max_requests => RateDecision {
                allowed: false,
                limit: quota.max_requests,
                remaining: 0,
                reset_at: window.reset_at,
            },
            Some(mut window) => {
                window.count += 1;
                windows.insert(key.to_string(), window);
                RateDecision {
                    allowed: true,
                    limit: quota.max_requests,
                    remaining: quota.max_requests - window.count,
                    reset_at: window.reset_at,
                }
            }
        };

        Ok(decision)
    }
}

/// Fixed-window rate limiter over a pluggable store.
pub struct RateLimiter {
    store: Arc<dyn RateWindowStore>,
    quotas: RateQuotas,
    fail_open: bool,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn RateWindowStore>, quotas: RateQuotas) -> Self {
        Self {
            store,
            quotas,
            fail_open: true,
        }
    }

    /// Deny instead of allow when the counter store is unreachable.
    #[must_use]
    pub fn with_fail_closed(mut self, fail_closed: bool) -> Self {
        self.fail_open = !fail_closed;
        self
    }

    /// Check and count one request from `identifier` under `scope`.
    pub async fn check(&self, scope: RateScope, identifier: &str) -> RateDecision {
        self.check_at(scope, identifier, Utc::now()).await
    }

    /// Like [`RateLimiter::check`] with an explicit clock, for tests.
    pub async fn check_at(
        &self,
        scope: RateScope,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> RateDecision {
        let quota = self.quotas.for_scope(scope);
        let key = format!("{}:{identifier}", scope.as_str());
        match self.store.hit(&key, quota, now).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    scope = scope.as_str(),
                    fail_open = self.fail_open,
                    "rate window store unavailable: {err}"
                );
                // Availability over strict abuse prevention when the counter
                // store is degraded; the inverse when configured fail-closed.
                RateDecision {
                    allowed: self.fail_open,
                    limit: quota.max_requests,
                    remaining: if self.fail_open { quota.max_requests } else { 0 },
                    reset_at: now + quota.window,
                }
            }
        }
    }
}
