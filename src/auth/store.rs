//! User persistence collaborator.
//!
//! The auth core only reads and writes user records through this narrow
//! interface. The in-memory implementation is the default for tests and
//! single-process development; `postgres.rs` provides the durable one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

/// Flat role tag carried by user records and session tokens.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    Organizer,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Organizer => "organizer",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            "organizer" => Some(Self::Organizer),
            _ => None,
        }
    }
}

/// A stored user.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    /// Unique, case-folded.
    pub email: String,
    /// PHC-format argon2 digest.
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
    pub display_name: Option<String>,
    /// Session tokens issued before this instant are rejected. Set by
    /// password reset to revoke existing sessions.
    pub sessions_invalid_before: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a user.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub display_name: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct UserPatch {
    pub password_hash: Option<String>,
    pub email_verified: Option<bool>,
    pub sessions_invalid_before: Option<DateTime<Utc>>,
}

/// Outcome of a create attempt; uniqueness races surface as `Conflict`.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(UserRecord),
    Conflict,
}

/// Narrow persistence interface consumed by the orchestrator.
///
/// Implementations must provide read-your-writes consistency within a single
/// request.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// # Errors
    /// Returns an error when the backend is unreachable.
    async fn get_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>>;
    /// # Errors
    /// Returns an error when the backend is unreachable.
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>>;
    /// # Errors
    /// Returns an error when the backend is unreachable.
    async fn create(&self, user: NewUser) -> anyhow::Result<CreateOutcome>;
    /// # Errors
    /// Returns an error when the backend is unreachable or the user is gone.
    async fn update(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<()>;
    /// Liveness probe for the health endpoint.
    ///
    /// # Errors
    /// Returns an error when the backend is unreachable.
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-memory user store.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, UserRecord>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>> {
        let users = self
            .users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store poisoned"))?;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>> {
        let users = self
            .users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store poisoned"))?;
        Ok(users.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<CreateOutcome> {
        let mut users = self
            .users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store poisoned"))?;
        if users.values().any(|existing| existing.email == user.email) {
            return Ok(CreateOutcome::Conflict);
        }
        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            email_verified: false,
            display_name: user.display_name,
            sessions_invalid_before: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(record.id, record.clone());
        Ok(CreateOutcome::Created(record))
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<()> {
        let mut users = self
            .users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store poisoned"))?;
        let record = users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not found"))?;
        if let Some(password_hash) = patch.password_hash {
            record.password_hash = password_hash;
        }
        if let Some(email_verified) = patch.email_verified {
            record.email_verified = email_verified;
        }
        if let Some(cutoff) = patch.sessions_invalid_before {
            record.sessions_invalid_before = Some(cutoff);
        }
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "digest".to_string(),
            role: Role::User,
            display_name: None,
        }
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let store = InMemoryUserStore::new();
        let CreateOutcome::Created(user) = store
            .create(new_user("alice@example.com"))
            .await
            .expect("create failed")
        else {
            panic!("unexpected conflict");
        };
        assert!(!user.email_verified);

        let by_email = store
            .get_by_email("alice@example.com")
            .await
            .expect("lookup failed")
            .expect("user missing");
        assert_eq!(by_email.id, user.id);
        assert!(
            store
                .get_by_email("nobody@example.com")
                .await
                .expect("lookup failed")
                .is_none()
        );
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = InMemoryUserStore::new();
        store
            .create(new_user("alice@example.com"))
            .await
            .expect("create failed");
        assert!(matches!(
            store
                .create(new_user("alice@example.com"))
                .await
                .expect("create failed"),
            CreateOutcome::Conflict
        ));
    }

    #[tokio::test]
    async fn patch_updates_only_provided_fields() {
        let store = InMemoryUserStore::new();
        let CreateOutcome::Created(user) = store
            .create(new_user("alice@example.com"))
            .await
            .expect("create failed")
        else {
            panic!("unexpected conflict");
        };

        store
            .update(
                user.id,
                UserPatch {
                    email_verified: Some(true),
                    ..UserPatch::default()
                },
            )
            .await
            .expect("update failed");

        let updated = store
            .get_by_id(user.id)
            .await
            .expect("lookup failed")
            .expect("user missing");
        assert!(updated.email_verified);
        assert_eq!(updated.password_hash, "digest");
        assert!(updated.sessions_invalid_before.is_none());
    }

    #[test]
    fn role_parse_round_trips() {
        for role in [Role::User, Role::Admin, Role::Organizer] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }
}
