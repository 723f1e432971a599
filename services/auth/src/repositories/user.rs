//! User repository for database operations
//!
//! Multi-record writes (user + accounts, verify + activate) run inside a
//! single transaction so a partial write is never observable. Code
//! consumption is expressed as conditional UPDATEs: the WHERE clause
//! re-checks the code and its expiry so the read-then-write race cannot
//! consume a stale code.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::{Account, NewUser, User};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, verified, \
     verification_code, verification_code_expires_at, reset_code, reset_code_expires_at, \
     created_at, updated_at";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a user together with one pending account per requested kind.
    /// One transaction: either the user and all accounts exist, or nothing
    /// does. A concurrent duplicate registration trips the unique index on
    /// `lower(email)`; use [`is_unique_violation`] to classify that error.
    pub async fn create(&self, new_user: &NewUser, account_kinds: &[String]) -> Result<User> {
        info!("Creating new user: {}", new_user.email);

        let mut tx = self.pool.begin().await?;

        let user: User = sqlx::query_as(&format!(
            "INSERT INTO users \
             (email, password_hash, first_name, last_name, verification_code, verification_code_expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.verification_code)
        .bind(new_user.verification_code_expires_at)
        .fetch_one(&mut *tx)
        .await?;

        for kind in account_kinds {
            sqlx::query("INSERT INTO accounts (user_id, kind) VALUES ($1, $2)")
                .bind(user.id)
                .bind(kind)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(user)
    }

    /// Find a user by email (callers pass the normalized, lowercase form)
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Consume a verification code: flip the user to verified, clear the
    /// code and its expiry, and activate the user's accounts, all in one
    /// transaction. Returns false when nothing matched — wrong email, wrong
    /// code, expired code, or already verified.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Uuid,)> = sqlx::query_as(
            "UPDATE users \
             SET verified = TRUE, verification_code = NULL, \
                 verification_code_expires_at = NULL, updated_at = now() \
             WHERE email = $1 AND verified = FALSE \
               AND verification_code = $2 \
               AND verification_code_expires_at > now() \
             RETURNING id",
        )
        .bind(email)
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id,)) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("UPDATE accounts SET status = 'active', updated_at = now() WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("User {} verified", user_id);
        Ok(true)
    }

    /// Store a fresh verification code and expiry, overwriting any code
    /// still outstanding. Only meaningful for unverified users.
    pub async fn set_verification_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users \
             SET verification_code = $2, verification_code_expires_at = $3, updated_at = now() \
             WHERE id = $1 AND verified = FALSE",
        )
        .bind(id)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List the trading accounts owned by a user
    pub async fn find_accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>> {
        let accounts = sqlx::query_as(
            "SELECT id, user_id, kind, status, balance_cents, created_at, updated_at \
             FROM accounts WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    /// Store a password reset code and its expiry, overwriting any code
    /// still outstanding for this user.
    pub async fn set_reset_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users \
             SET reset_code = $2, reset_code_expires_at = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set a new password hash and clear the reset code and its expiry in
    /// one atomic UPDATE, consuming the code. Returns false when the code
    /// no longer matches or has expired since the caller checked it.
    pub async fn update_password_and_clear_reset(
        &self,
        email: &str,
        code: &str,
        new_password_hash: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users \
             SET password_hash = $3, reset_code = NULL, \
                 reset_code_expires_at = NULL, updated_at = now() \
             WHERE email = $1 AND reset_code = $2 \
               AND reset_code_expires_at > now()",
        )
        .bind(email)
        .bind(code)
        .bind(new_password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Whether an error from [`UserRepository::create`] is the unique-index
/// rejection of a duplicate email (PostgreSQL error 23505).
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}
