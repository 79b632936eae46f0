//! Realtime event catalogue carried over the gateway as JSON text frames
//! shaped `{"event": "<name>", "data": <payload>}`.

use crate::domain::message::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed from the server to a connected client.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    GetOnlineUsers(Vec<Uuid>),
    #[serde(rename_all = "camelCase")]
    Typing { sender_id: Uuid },
    #[serde(rename_all = "camelCase")]
    StopTyping { sender_id: Uuid },
    NewMessage(Message),
    MessageUpdated(Message),
    MessageDeleted { id: Uuid },
    #[serde(rename_all = "camelCase")]
    MessagesSeen { sender_id: Uuid, receiver_id: Uuid },
}

impl ServerEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetOnlineUsers(_) => "getOnlineUsers",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stopTyping",
            Self::NewMessage(_) => "newMessage",
            Self::MessageUpdated(_) => "messageUpdated",
            Self::MessageDeleted { .. } => "messageDeleted",
            Self::MessagesSeen { .. } => "messagesSeen",
        }
    }
}

/// Events a client may send over its connection. Any `senderId` the client
/// includes is ignored; the connection's own user is the sender.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    Typing { receiver_id: Uuid },
    #[serde(rename_all = "camelCase")]
    StopTyping { receiver_id: Uuid },
}
