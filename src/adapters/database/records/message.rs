use crate::domain::message::{Interaction, Message};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) receiver_id: Uuid,
    pub(crate) text: Option<String>,
    pub(crate) image: Option<String>,
    pub(crate) is_seen: bool,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            text: record.text,
            image: record.image,
            is_seen: record.is_seen,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct InteractionRecord {
    pub(crate) counterpart_id: Uuid,
    pub(crate) last_message_at: OffsetDateTime,
}

impl From<InteractionRecord> for Interaction {
    fn from(record: InteractionRecord) -> Self {
        Self { counterpart_id: record.counterpart_id, last_message_at: record.last_message_at }
    }
}
