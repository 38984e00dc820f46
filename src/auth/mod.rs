//! Authentication and abuse-prevention core.
//!
//! Leaves first: credential hashing (`password`), purpose-scoped tokens
//! (`token`), fixed-window rate limiting (`rate_limit`), progressive lockout
//! (`lockout`). The orchestrator (`service`) composes them with the
//! persistence, email, and audit collaborators and is the only piece the
//! request layer talks to. Each stage can short-circuit a request.

pub mod audit;
pub mod email;
pub mod error;
pub mod lockout;
pub mod password;
pub mod postgres;
pub mod rate_limit;
pub mod service;
pub mod store;
pub mod token;

pub use error::AuthError;
pub use lockout::{InMemoryLockoutStore, LockoutPolicy, LockoutStatus, LockoutTracker};
pub use rate_limit::{InMemoryRateStore, RateLimiter, RateQuotas, RateScope};
pub use service::{AuthConfig, AuthService, Principal, RegisterRequest};
pub use store::{InMemoryUserStore, Role, UserStore};
pub use token::{TokenPurpose, TokenService, TokenTtls};
