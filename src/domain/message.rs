use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: Option<String>,
    pub image: Option<String>,
    pub is_seen: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Message {
    /// A message counts as edited exactly when its update timestamp is past
    /// its creation timestamp. There is no separate flag.
    #[must_use]
    pub fn is_edited(&self) -> bool {
        self.updated_at > self.created_at
    }

    /// The participant of the thread that is not `user_id`.
    #[must_use]
    pub fn counterpart_of(&self, user_id: Uuid) -> Uuid {
        if self.sender_id == user_id { self.receiver_id } else { self.sender_id }
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MessageEdit {
    pub text: Option<String>,
    pub image: Option<String>,
}

/// Latest message time between a user and one counterpart, used to order the
/// contacts sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interaction {
    pub counterpart_id: Uuid,
    pub last_message_at: OffsetDateTime,
}

/// Trims text input and maps blank strings to `None`.
#[must_use]
pub fn normalize_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn message_at(created_at: OffsetDateTime, updated_at: OffsetDateTime) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            text: Some("hi".to_string()),
            image: None,
            is_seen: false,
            created_at,
            updated_at,
        }
    }

    #[test]
    fn test_fresh_message_is_not_edited() {
        let now = OffsetDateTime::now_utc();
        assert!(!message_at(now, now).is_edited());
    }

    #[test]
    fn test_later_update_marks_edited() {
        let now = OffsetDateTime::now_utc();
        assert!(message_at(now, now + Duration::microseconds(1)).is_edited());
    }

    #[test]
    fn test_counterpart() {
        let msg = message_at(OffsetDateTime::now_utc(), OffsetDateTime::now_utc());
        assert_eq!(msg.counterpart_of(msg.sender_id), msg.receiver_id);
        assert_eq!(msg.counterpart_of(msg.receiver_id), msg.sender_id);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text(Some("  hi  ".to_string())), Some("hi".to_string()));
        assert_eq!(normalize_text(Some("   ".to_string())), None);
        assert_eq!(normalize_text(None), None);
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let now = OffsetDateTime::now_utc();
        let json = serde_json::to_value(message_at(now, now)).unwrap();
        assert!(json.get("senderId").is_some());
        assert!(json.get("receiverId").is_some());
        assert!(json.get("isSeen").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
