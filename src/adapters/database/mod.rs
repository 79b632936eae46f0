pub mod message_repo;
pub mod records;
pub mod user_repo;

use crate::config::DatabaseConfig;
use crate::domain::message::{Interaction, Message, MessageEdit, NewMessage};
use crate::domain::user::{NewUser, ProfileUpdate, User};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

pub use message_repo::PgMessageRepository;
pub use user_repo::PgUserRepository;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(config: &DatabaseConfig) -> std::result::Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
}

/// Durable storage of user accounts, presence and one-time tokens.
#[async_trait]
pub trait UserRepository: Send + Sync + std::fmt::Debug {
    /// Returns `AppError::Conflict` if the email is already registered.
    async fn create(&self, user: NewUser) -> Result<User>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Every user except `id`, oldest account first.
    async fn list_except(&self, id: Uuid) -> Result<Vec<User>>;

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>>;

    async fn set_presence(&self, id: Uuid, is_online: bool, last_seen: Option<OffsetDateTime>) -> Result<()>;

    async fn set_reset_token(&self, id: Uuid, token_hash: &str, expires_at: OffsetDateTime) -> Result<()>;

    /// Replaces the password of the user holding an unexpired reset token and
    /// clears the token. Returns the user id, or `None` if no token matched.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>>;

    async fn set_verification_token(&self, id: Uuid, token_hash: &str, expires_at: OffsetDateTime) -> Result<()>;

    /// Marks the holder of an unexpired verification token as verified and
    /// clears the token.
    async fn consume_verification_token(&self, token_hash: &str, now: OffsetDateTime) -> Result<Option<User>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

/// Durable storage of direct messages.
#[async_trait]
pub trait MessageRepository: Send + Sync + std::fmt::Debug {
    /// Returns `AppError::NotFound` if either participant does not exist.
    async fn create(&self, message: NewMessage) -> Result<Message>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>>;

    /// Messages exchanged between `a` and `b` in either direction, oldest first.
    async fn list_thread(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>>;

    /// Applies the edit and moves `updated_at` strictly past `created_at`.
    async fn update(&self, id: Uuid, edit: MessageEdit) -> Result<Option<Message>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Flags unseen messages from `sender_id` to `receiver_id` as seen without
    /// touching `updated_at`. Returns how many were flagged.
    async fn mark_seen(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<u64>;

    /// Latest message time per counterpart of `user_id`.
    async fn latest_interactions(&self, user_id: Uuid) -> Result<Vec<Interaction>>;

    /// Removes every message sent or received by `user_id`.
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64>;
}
