use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::users::repo_types::{NewUser, OtpChallenge, ProfileUpdate, Role, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("phone already registered")]
    DuplicatePhone,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for user records. Every method touches a single row.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>>;
    /// All users, or only those holding `role`, newest first.
    async fn list(&self, role: Option<Role>) -> anyhow::Result<Vec<User>>;
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;
    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<User>, StoreError>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Replaces any outstanding challenge.
    async fn set_otp(&self, id: Uuid, challenge: &OtpChallenge) -> anyhow::Result<bool>;
    /// Stores the new PIN hash and clears the challenge in one write, only while
    /// `expected_code` is still the live, unexpired challenge. `false` when nothing matched.
    async fn reset_pin(&self, id: Uuid, expected_code: &str, pin_hash: &str)
        -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_err(e: sqlx::Error, what: &'static str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicatePhone,
        _ => StoreError::Backend(anyhow::Error::new(e).context(what)),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, phone, pin_hash, role, location, preferred_language,
                   otp_code, otp_expires_at, is_verified, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, phone, pin_hash, role, location, preferred_language,
                   otp_code, otp_expires_at, is_verified, created_at, updated_at
            FROM users
            WHERE phone = $1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.db)
        .await
        .context("find user by phone")?;
        Ok(user)
    }

    async fn list(&self, role: Option<Role>) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, phone, pin_hash, role, location, preferred_language,
                   otp_code, otp_expires_at, is_verified, created_at, updated_at
            FROM users
            WHERE $1::user_role IS NULL OR role = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(role)
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(rows)
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, phone, pin_hash, role, location, preferred_language)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, phone, pin_hash, role, location, preferred_language,
                      otp_code, otp_expires_at, is_verified, created_at, updated_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.pin_hash)
        .bind(new.role)
        .bind(&new.location)
        .bind(new.preferred_language)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_err(e, "insert user"))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET name               = COALESCE($2, name),
                   phone              = COALESCE($3, phone),
                   location           = COALESCE($4, location),
                   preferred_language = COALESCE($5, preferred_language),
                   role               = COALESCE($6, role),
                   updated_at         = now()
             WHERE id = $1
            RETURNING id, name, phone, pin_hash, role, location, preferred_language,
                      otp_code, otp_expires_at, is_verified, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.phone)
        .bind(update.location)
        .bind(update.preferred_language)
        .bind(update.role)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_err(e, "update user profile"))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_otp(&self, id: Uuid, challenge: &OtpChallenge) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET otp_code = $2, otp_expires_at = $3, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&challenge.code)
        .bind(challenge.expires_at)
        .execute(&self.db)
        .await
        .context("store otp challenge")?;
        Ok(res.rows_affected() > 0)
    }

    async fn reset_pin(
        &self,
        id: Uuid,
        expected_code: &str,
        pin_hash: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET pin_hash = $2, otp_code = NULL, otp_expires_at = NULL, updated_at = now()
             WHERE id = $1
               AND otp_code = $3
               AND otp_expires_at > now()
            "#,
        )
        .bind(id)
        .bind(pin_hash)
        .bind(expected_code)
        .execute(&self.db)
        .await
        .context("reset pin")?;
        Ok(res.rows_affected() > 0)
    }
}
