//! PostgreSQL-backed stores (`db/schema.sql`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::lockout::{LockoutRecord, LockoutStore};
use super::store::{CreateOutcome, NewUser, Role, UserPatch, UserRecord, UserStore};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    Ok(UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: Role::parse(&role).with_context(|| format!("unknown role in database: {role}"))?,
        email_verified: row.get("email_verified"),
        display_name: row.get("display_name"),
        sessions_invalid_before: row.get("sessions_invalid_before"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const USER_COLUMNS: &str = "id, email, password_hash, role, email_verified, display_name, \
                            sessions_invalid_before, created_at, updated_at";

/// `UserStore` over the `users` table.
#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome> {
        let query = format!(
            "INSERT INTO users (email, password_hash, role, display_name) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        let row = sqlx::query(&query)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(&user.display_name)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(CreateOutcome::Created(user_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<()> {
        let query = r"
            UPDATE users SET
                password_hash = COALESCE($2, password_hash),
                email_verified = COALESCE($3, email_verified),
                sessions_invalid_before = COALESCE($4, sessions_invalid_before),
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(patch.password_hash)
            .bind(patch.email_verified)
            .bind(patch.sessions_invalid_before)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update user")?;
        if result.rows_affected() == 0 {
            anyhow::bail!("user {id} not found");
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to ping database")?;
        Ok(())
    }
}

/// `LockoutStore` over the `lockouts` table.
#[derive(Clone, Debug)]
pub struct PgLockoutStore {
    pool: PgPool,
}

impl PgLockoutStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockoutStore for PgLockoutStore {
    async fn get(&self, key: &str) -> Result<Option<LockoutRecord>> {
        let query = "SELECT failed_attempts, last_attempt, locked_until \
                     FROM lockouts WHERE account_key = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup lockout record")?;
        Ok(row.map(|row| {
            let failed_attempts: i32 = row.get("failed_attempts");
            let last_attempt: Option<DateTime<Utc>> = row.get("last_attempt");
            let locked_until: Option<DateTime<Utc>> = row.get("locked_until");
            LockoutRecord {
                failed_attempts: failed_attempts.max(0) as u32,
                last_attempt,
                locked_until,
            }
        }))
    }

    async fn put(&self, key: &str, record: LockoutRecord) -> Result<()> {
        let query = r"
            INSERT INTO lockouts (account_key, failed_attempts, last_attempt, locked_until, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (account_key) DO UPDATE SET
                failed_attempts = EXCLUDED.failed_attempts,
                last_attempt = EXCLUDED.last_attempt,
                locked_until = EXCLUDED.locked_until,
                updated_at = NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT"
        );
        sqlx::query(query)
            .bind(key)
            .bind(i32::try_from(record.failed_attempts).unwrap_or(i32::MAX))
            .bind(record.last_attempt)
            .bind(record.locked_until)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert lockout record")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let query = "DELETE FROM lockouts WHERE account_key = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE"
        );
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete lockout record")?;
        Ok(())
    }
}
