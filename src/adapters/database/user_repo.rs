use crate::adapters::database::records::UserRecord;
use crate::adapters::database::{DbPool, UserRepository};
use crate::domain::user::{DEFAULT_PROFILE_PIC, NewUser, ProfileUpdate, User};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, full_name, email, password_hash, profile_pic, bio, is_verified, \
     verification_token_hash, verification_expires_at, reset_token_hash, reset_expires_at, \
     is_online, last_seen, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgUserRepository {
    pool: DbPool,
}

impl PgUserRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[tracing::instrument(level = "debug", skip(self, user), err)]
    async fn create(&self, user: NewUser) -> Result<User> {
        let result = sqlx::query_as::<_, UserRecord>(&format!(
            r"
            INSERT INTO users (id, full_name, email, password_hash, profile_pic, is_verified)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(Uuid::now_v7())
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.profile_pic.as_deref().unwrap_or(DEFAULT_PROFILE_PIC))
        .bind(user.is_verified)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23505") => {
                Err(AppError::Conflict("User already exists".to_string()))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self, email), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn list_except(&self, id: Uuid) -> Result<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id <> $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(level = "debug", skip(self, update), err)]
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r"
            UPDATE users
            SET full_name = COALESCE($2, full_name),
                profile_pic = COALESCE($3, profile_pic),
                bio = COALESCE($4, bio),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(update.full_name)
        .bind(update.profile_pic)
        .bind(update.bio)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn set_presence(&self, id: Uuid, is_online: bool, last_seen: Option<OffsetDateTime>) -> Result<()> {
        sqlx::query("UPDATE users SET is_online = $2, last_seen = COALESCE($3, last_seen) WHERE id = $1")
            .bind(id)
            .bind(is_online)
            .bind(last_seen)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, token_hash), err)]
    async fn set_reset_token(&self, id: Uuid, token_hash: &str, expires_at: OffsetDateTime) -> Result<()> {
        sqlx::query("UPDATE users SET reset_token_hash = $2, reset_expires_at = $3 WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, token_hash, password_hash), err)]
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r"
            UPDATE users
            SET password_hash = $2,
                reset_token_hash = NULL,
                reset_expires_at = NULL,
                updated_at = NOW()
            WHERE reset_token_hash = $1 AND reset_expires_at > $3
            RETURNING id
            ",
        )
        .bind(token_hash)
        .bind(password_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }

    #[tracing::instrument(level = "debug", skip(self, token_hash), err)]
    async fn set_verification_token(&self, id: Uuid, token_hash: &str, expires_at: OffsetDateTime) -> Result<()> {
        sqlx::query("UPDATE users SET verification_token_hash = $2, verification_expires_at = $3 WHERE id = $1")
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, token_hash), err)]
    async fn consume_verification_token(&self, token_hash: &str, now: OffsetDateTime) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r"
            UPDATE users
            SET is_verified = TRUE,
                verification_token_hash = NULL,
                verification_expires_at = NULL,
                updated_at = NOW()
            WHERE verification_token_hash = $1 AND verification_expires_at > $2
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
