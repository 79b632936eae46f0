use crate::adapters::database::records::{InteractionRecord, MessageRecord};
use crate::adapters::database::{DbPool, MessageRepository};
use crate::domain::message::{Interaction, Message, MessageEdit, NewMessage};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, image, is_seen, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgMessageRepository {
    pool: DbPool,
}

impl PgMessageRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    /// Records a new message. `updated_at` starts equal to `created_at`.
    #[tracing::instrument(level = "debug", skip(self, message), err)]
    async fn create(&self, message: NewMessage) -> Result<Message> {
        let result = sqlx::query_as::<_, MessageRecord>(&format!(
            r"
            INSERT INTO messages (id, sender_id, receiver_id, text, image, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING {MESSAGE_COLUMNS}
            "
        ))
        .bind(Uuid::now_v7())
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(message.text)
        .bind(message.image)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => {
                // Foreign key violation: a participant does not exist
                Err(AppError::NotFound("User not found".to_string()))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let record =
            sqlx::query_as::<_, MessageRecord>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn list_thread(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY created_at ASC, id ASC
            "
        ))
        .bind(a)
        .bind(b)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(level = "debug", skip(self, edit), err)]
    async fn update(&self, id: Uuid, edit: MessageEdit) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r"
            UPDATE messages
            SET text = COALESCE($2, text),
                image = COALESCE($3, image),
                updated_at = GREATEST(NOW(), created_at + INTERVAL '1 microsecond')
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "
        ))
        .bind(id)
        .bind(edit.text)
        .bind(edit.image)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn mark_seen(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET is_seen = TRUE WHERE sender_id = $1 AND receiver_id = $2 AND is_seen = FALSE",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn latest_interactions(&self, user_id: Uuid) -> Result<Vec<Interaction>> {
        let records = sqlx::query_as::<_, InteractionRecord>(
            r"
            SELECT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS counterpart_id,
                   MAX(created_at) AS last_message_at
            FROM messages
            WHERE sender_id = $1 OR receiver_id = $1
            GROUP BY 1
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE sender_id = $1 OR receiver_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
