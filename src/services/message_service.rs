use crate::adapters::database::{MessageRepository, UserRepository};
use crate::domain::events::ServerEvent;
use crate::domain::message::{Message, MessageEdit, NewMessage, normalize_text};
use crate::error::{AppError, Result};
use crate::services::gateway::GatewayService;
use crate::services::media_service::{MediaFolder, MediaService};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) sent_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            sent_total: meter
                .u64_counter("messages_sent_total")
                .with_description("Total messages sent, by outcome")
                .build(),
        }
    }
}

/// Message lifecycle operations. Each mutation is persisted first and then
/// announced to the other participant over the gateway, if they are connected.
#[derive(Clone, Debug)]
pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    users: Arc<dyn UserRepository>,
    media: MediaService,
    gateway: GatewayService,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        users: Arc<dyn UserRepository>,
        media: MediaService,
        gateway: GatewayService,
    ) -> Self {
        Self { messages, users, media, gateway, metrics: Metrics::new() }
    }

    /// Full conversation between two users, oldest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the thread cannot be loaded.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list_thread(&self, user_id: Uuid, other_id: Uuid) -> Result<Vec<Message>> {
        self.messages.list_thread(user_id, other_id).await
    }

    /// Persists a new message and pushes it to the receiver.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if both text and image are absent.
    /// Returns `AppError::NotFound` if the receiver does not exist.
    /// Returns `AppError::Upstream` if the image upload fails.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, text, image),
        fields(has_text = text.is_some(), has_image = image.is_some(), message_id = tracing::field::Empty)
    )]
    pub async fn send(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: Option<String>,
        image: Option<String>,
    ) -> Result<Message> {
        let result = self.send_inner(sender_id, receiver_id, text, image).await;
        let status = if result.is_ok() { "success" } else { "failure" };
        self.metrics.sent_total.add(1, &[KeyValue::new("status", status)]);
        result
    }

    async fn send_inner(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: Option<String>,
        image: Option<String>,
    ) -> Result<Message> {
        let text = normalize_text(text);
        let image = image.filter(|i| !i.trim().is_empty());
        if text.is_none() && image.is_none() {
            return Err(AppError::Validation("Message must contain text or an image".to_string()));
        }

        // Checked before the upload so a bad receiver never leaves an orphaned blob.
        if self.users.find_by_id(receiver_id).await?.is_none() {
            return Err(AppError::NotFound("Receiver not found".to_string()));
        }

        let image = match image {
            Some(payload) => Some(self.media.upload_image(MediaFolder::Messages, &payload).await?),
            None => None,
        };

        let message = self.messages.create(NewMessage { sender_id, receiver_id, text, image }).await?;
        tracing::Span::current().record("message_id", tracing::field::display(message.id));

        self.gateway.emit_to_user(receiver_id, ServerEvent::NewMessage(message.clone()));
        Ok(message)
    }

    /// Edits a message the caller sent and pushes the result to the other party.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message does not exist.
    /// Returns `AppError::Forbidden` if the caller is not the sender.
    /// Returns `AppError::Validation` if neither text nor image is supplied.
    #[tracing::instrument(err(level = "warn"), skip(self, text, image))]
    pub async fn update(
        &self,
        message_id: Uuid,
        caller_id: Uuid,
        text: Option<String>,
        image: Option<String>,
    ) -> Result<Message> {
        let existing = self.owned_message(message_id, caller_id).await?;

        let text = normalize_text(text);
        let image = image.filter(|i| !i.trim().is_empty());
        if text.is_none() && image.is_none() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }

        let image = match image {
            Some(payload) => Some(self.media.upload_image(MediaFolder::Messages, &payload).await?),
            None => None,
        };

        let updated = self
            .messages
            .update(message_id, MessageEdit { text, image })
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

        self.gateway.emit_to_user(existing.counterpart_of(caller_id), ServerEvent::MessageUpdated(updated.clone()));
        Ok(updated)
    }

    /// Removes a message the caller sent and tells the other party.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message does not exist.
    /// Returns `AppError::Forbidden` if the caller is not the sender.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn delete(&self, message_id: Uuid, caller_id: Uuid) -> Result<Uuid> {
        let existing = self.owned_message(message_id, caller_id).await?;

        if !self.messages.delete(message_id).await? {
            return Err(AppError::NotFound("Message not found".to_string()));
        }

        self.gateway.emit_to_user(existing.counterpart_of(caller_id), ServerEvent::MessageDeleted { id: message_id });
        Ok(message_id)
    }

    /// Flags every unseen message from `sender_id` to the caller as seen and
    /// notifies the sender once.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn mark_seen(&self, caller_id: Uuid, sender_id: Uuid) -> Result<u64> {
        let count = self.messages.mark_seen(sender_id, caller_id).await?;
        tracing::debug!(count, "Messages marked as seen");

        self.gateway.emit_to_user(sender_id, ServerEvent::MessagesSeen { sender_id, receiver_id: caller_id });
        Ok(count)
    }

    async fn owned_message(&self, message_id: Uuid, caller_id: Uuid) -> Result<Message> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

        if message.sender_id != caller_id {
            return Err(AppError::Forbidden("Only the sender can modify this message".to_string()));
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::adapters::storage::MemoryStorage;
    use crate::config::{StorageConfig, WsConfig};
    use crate::domain::user::NewUser;
    use crate::services::gateway::registry::{ConnectionHandle, ConnectionRegistry};
    use base64::Engine;
    use tokio::sync::mpsc;

    struct Harness {
        service: MessageService,
        gateway: GatewayService,
        store: InMemoryStore,
        storage: MemoryStorage,
    }

    fn harness() -> Harness {
        let store = InMemoryStore::new();
        let storage = MemoryStorage::new();
        let config = StorageConfig {
            bucket: "test".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
            public_url: "https://cdn.example".to_string(),
            max_image_bytes: 1024,
        };
        let media = MediaService::new(Arc::new(storage.clone()), &config);
        let registry = ConnectionRegistry::new(Arc::new(store.clone()));
        let gateway = GatewayService::new(registry, WsConfig { outbound_buffer_size: 16, verify_session: false });
        let service = MessageService::new(Arc::new(store.clone()), Arc::new(store.clone()), media, gateway.clone());
        Harness { service, gateway, store, storage }
    }

    async fn user(store: &InMemoryStore, email: &str) -> Uuid {
        let new_user = NewUser {
            full_name: email.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            profile_pic: None,
            is_verified: false,
        };
        UserRepository::create(store, new_user).await.unwrap().id
    }

    async fn connect(gateway: &GatewayService, user_id: Uuid) -> mpsc::Receiver<ServerEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        gateway.registry().register(user_id, ConnectionHandle::new(tx));
        while let Ok(Some(ServerEvent::GetOnlineUsers(_))) =
            tokio::time::timeout(std::time::Duration::from_millis(20), rx.recv()).await
        {}
        rx
    }

    #[tokio::test]
    async fn test_send_pushes_to_connected_receiver() {
        let h = harness();
        let (a, b) = (user(&h.store, "a@x.io").await, user(&h.store, "b@x.io").await);
        let mut rx_b = connect(&h.gateway, b).await;

        let message = h.service.send(a, b, Some("  hello ".to_string()), None).await.unwrap();
        assert_eq!(message.text.as_deref(), Some("hello"));
        assert!(!message.is_edited());

        assert_eq!(rx_b.recv().await.unwrap(), ServerEvent::NewMessage(message));
    }

    #[tokio::test]
    async fn test_send_to_offline_receiver_still_persists() {
        let h = harness();
        let (a, b) = (user(&h.store, "a@x.io").await, user(&h.store, "b@x.io").await);

        h.service.send(a, b, Some("hi".to_string()), None).await.unwrap();
        assert_eq!(h.service.list_thread(b, a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let h = harness();
        let (a, b) = (user(&h.store, "a@x.io").await, user(&h.store, "b@x.io").await);

        let result = h.service.send(a, b, Some("   ".to_string()), None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(h.service.list_thread(a, b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_receiver_uploads_nothing() {
        let h = harness();
        let a = user(&h.store, "a@x.io").await;
        let png = base64::engine::general_purpose::STANDARD.encode([0x89, b'P', b'N', b'G', 0, 0]);

        let result = h.service.send(a, Uuid::new_v4(), None, Some(png)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(h.storage.is_empty());
    }

    #[tokio::test]
    async fn test_image_message_stores_url() {
        let h = harness();
        let (a, b) = (user(&h.store, "a@x.io").await, user(&h.store, "b@x.io").await);
        let png = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode([0x89, b'P', b'N', b'G', 0, 0])
        );

        let message = h.service.send(a, b, None, Some(png)).await.unwrap();
        let url = message.image.unwrap();
        assert!(url.starts_with("https://cdn.example/messages/"));
        assert_eq!(h.storage.len(), 1);
    }

    #[tokio::test]
    async fn test_update_by_non_sender_forbidden() {
        let h = harness();
        let (a, b) = (user(&h.store, "a@x.io").await, user(&h.store, "b@x.io").await);
        let message = h.service.send(a, b, Some("hi".to_string()), None).await.unwrap();

        let result = h.service.update(message.id, b, Some("hacked".to_string()), None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let thread = h.service.list_thread(a, b).await.unwrap();
        assert_eq!(thread[0].text.as_deref(), Some("hi"));
        assert!(!thread[0].is_edited());
    }

    #[tokio::test]
    async fn test_update_marks_edited_and_notifies() {
        let h = harness();
        let (a, b) = (user(&h.store, "a@x.io").await, user(&h.store, "b@x.io").await);
        let message = h.service.send(a, b, Some("hi".to_string()), None).await.unwrap();
        let mut rx_b = connect(&h.gateway, b).await;

        let updated = h.service.update(message.id, a, Some("hello".to_string()), None).await.unwrap();
        assert!(updated.is_edited());
        assert_eq!(updated.text.as_deref(), Some("hello"));
        assert_eq!(rx_b.recv().await.unwrap(), ServerEvent::MessageUpdated(updated));
    }

    #[tokio::test]
    async fn test_update_missing_message() {
        let h = harness();
        let a = user(&h.store, "a@x.io").await;
        let result = h.service.update(Uuid::new_v4(), a, Some("x".to_string()), None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_notifies_counterpart() {
        let h = harness();
        let (a, b) = (user(&h.store, "a@x.io").await, user(&h.store, "b@x.io").await);
        let message = h.service.send(a, b, Some("hi".to_string()), None).await.unwrap();
        let mut rx_b = connect(&h.gateway, b).await;

        assert!(matches!(h.service.delete(message.id, b).await, Err(AppError::Forbidden(_))));
        assert_eq!(h.service.delete(message.id, a).await.unwrap(), message.id);
        assert_eq!(rx_b.recv().await.unwrap(), ServerEvent::MessageDeleted { id: message.id });
        assert!(h.service.list_thread(a, b).await.unwrap().is_empty());
        assert!(matches!(h.service.delete(message.id, a).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_seen_emits_once_and_keeps_updated_at() {
        let h = harness();
        let (a, b) = (user(&h.store, "a@x.io").await, user(&h.store, "b@x.io").await);
        h.service.send(a, b, Some("one".to_string()), None).await.unwrap();
        h.service.send(a, b, Some("two".to_string()), None).await.unwrap();
        h.service.send(b, a, Some("reply".to_string()), None).await.unwrap();
        let mut rx_a = connect(&h.gateway, a).await;

        assert_eq!(h.service.mark_seen(b, a).await.unwrap(), 2);
        assert_eq!(rx_a.recv().await.unwrap(), ServerEvent::MessagesSeen { sender_id: a, receiver_id: b });
        assert!(rx_a.try_recv().is_err());

        let thread = h.service.list_thread(a, b).await.unwrap();
        for message in &thread {
            assert!(!message.is_edited());
            assert_eq!(message.is_seen, message.sender_id == a);
        }
    }
}
