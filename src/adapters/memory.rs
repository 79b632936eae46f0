//! In-process implementation of the repository traits, used for tests and
//! for running the server without PostgreSQL.

use crate::adapters::database::{MessageRepository, UserRepository};
use crate::domain::message::{Interaction, Message, MessageEdit, NewMessage};
use crate::domain::user::{DEFAULT_BIO, DEFAULT_PROFILE_PIC, NewUser, ProfileUpdate, User};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    users: DashMap<Uuid, User>,
    emails: DashMap<String, Uuid>,
    messages: DashMap<Uuid, Message>,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn find_user_where(&self, predicate: impl Fn(&User) -> bool) -> Option<Uuid> {
        self.inner.users.iter().find(|entry| predicate(entry.value())).map(|entry| *entry.key())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create(&self, user: NewUser) -> Result<User> {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::now_v7();

        match self.inner.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => return Err(AppError::Conflict("User already exists".to_string())),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let created = User {
            id,
            full_name: user.full_name,
            email: user.email,
            password_hash: user.password_hash,
            profile_pic: user.profile_pic.unwrap_or_else(|| DEFAULT_PROFILE_PIC.to_string()),
            bio: DEFAULT_BIO.to_string(),
            is_verified: user.is_verified,
            verification_token_hash: None,
            verification_expires_at: None,
            reset_token_hash: None,
            reset_expires_at: None,
            is_online: false,
            last_seen: now,
            created_at: now,
            updated_at: now,
        };
        self.inner.users.insert(id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let id = self.inner.emails.get(email).map(|id| *id);
        Ok(id.and_then(|id| self.inner.users.get(&id).map(|u| u.clone())))
    }

    async fn list_except(&self, id: Uuid) -> Result<Vec<User>> {
        let mut users: Vec<User> =
            self.inner.users.iter().filter(|entry| *entry.key() != id).map(|entry| entry.value().clone()).collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(users)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>> {
        Ok(self.inner.users.get_mut(&id).map(|mut user| {
            if let Some(full_name) = update.full_name {
                user.full_name = full_name;
            }
            if let Some(profile_pic) = update.profile_pic {
                user.profile_pic = profile_pic;
            }
            if let Some(bio) = update.bio {
                user.bio = bio;
            }
            user.updated_at = OffsetDateTime::now_utc();
            user.clone()
        }))
    }

    async fn set_presence(&self, id: Uuid, is_online: bool, last_seen: Option<OffsetDateTime>) -> Result<()> {
        if let Some(mut user) = self.inner.users.get_mut(&id) {
            user.is_online = is_online;
            if let Some(ts) = last_seen {
                user.last_seen = ts;
            }
        }
        Ok(())
    }

    async fn set_reset_token(&self, id: Uuid, token_hash: &str, expires_at: OffsetDateTime) -> Result<()> {
        if let Some(mut user) = self.inner.users.get_mut(&id) {
            user.reset_token_hash = Some(token_hash.to_string());
            user.reset_expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>> {
        let Some(id) = self.find_user_where(|u| {
            u.reset_token_hash.as_deref() == Some(token_hash) && u.reset_expires_at.is_some_and(|exp| exp > now)
        }) else {
            return Ok(None);
        };

        Ok(self.inner.users.get_mut(&id).map(|mut user| {
            user.password_hash = password_hash.to_string();
            user.reset_token_hash = None;
            user.reset_expires_at = None;
            user.updated_at = OffsetDateTime::now_utc();
            user.id
        }))
    }

    async fn set_verification_token(&self, id: Uuid, token_hash: &str, expires_at: OffsetDateTime) -> Result<()> {
        if let Some(mut user) = self.inner.users.get_mut(&id) {
            user.verification_token_hash = Some(token_hash.to_string());
            user.verification_expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn consume_verification_token(&self, token_hash: &str, now: OffsetDateTime) -> Result<Option<User>> {
        let Some(id) = self.find_user_where(|u| {
            u.verification_token_hash.as_deref() == Some(token_hash)
                && u.verification_expires_at.is_some_and(|exp| exp > now)
        }) else {
            return Ok(None);
        };

        Ok(self.inner.users.get_mut(&id).map(|mut user| {
            user.is_verified = true;
            user.verification_token_hash = None;
            user.verification_expires_at = None;
            user.updated_at = OffsetDateTime::now_utc();
            user.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        match self.inner.users.remove(&id) {
            Some((_, user)) => {
                self.inner.emails.remove(&user.email);
                self.inner.messages.retain(|_, m| m.sender_id != id && m.receiver_id != id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn create(&self, message: NewMessage) -> Result<Message> {
        if !self.inner.users.contains_key(&message.sender_id) || !self.inner.users.contains_key(&message.receiver_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let now = OffsetDateTime::now_utc();
        let created = Message {
            id: Uuid::now_v7(),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            text: message.text,
            image: message.image,
            is_seen: false,
            created_at: now,
            updated_at: now,
        };
        self.inner.messages.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.inner.messages.get(&id).map(|m| m.clone()))
    }

    async fn list_thread(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        let mut thread: Vec<Message> = self
            .inner
            .messages
            .iter()
            .filter(|entry| {
                let m = entry.value();
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .map(|entry| entry.value().clone())
            .collect();
        thread.sort_by_key(|m| (m.created_at, m.id));
        Ok(thread)
    }

    async fn update(&self, id: Uuid, edit: MessageEdit) -> Result<Option<Message>> {
        Ok(self.inner.messages.get_mut(&id).map(|mut message| {
            if let Some(text) = edit.text {
                message.text = Some(text);
            }
            if let Some(image) = edit.image {
                message.image = Some(image);
            }
            let floor = message.created_at + Duration::microseconds(1);
            message.updated_at = OffsetDateTime::now_utc().max(floor);
            message.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.messages.remove(&id).is_some())
    }

    async fn mark_seen(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<u64> {
        let mut flagged = 0;
        for mut entry in self.inner.messages.iter_mut() {
            let message = entry.value_mut();
            if message.sender_id == sender_id && message.receiver_id == receiver_id && !message.is_seen {
                message.is_seen = true;
                flagged += 1;
            }
        }
        Ok(flagged)
    }

    async fn latest_interactions(&self, user_id: Uuid) -> Result<Vec<Interaction>> {
        let mut latest: HashMap<Uuid, OffsetDateTime> = HashMap::new();
        for entry in self.inner.messages.iter() {
            let message = entry.value();
            if message.sender_id != user_id && message.receiver_id != user_id {
                continue;
            }
            let slot = latest.entry(message.counterpart_of(user_id)).or_insert(message.created_at);
            if message.created_at > *slot {
                *slot = message.created_at;
            }
        }

        Ok(latest
            .into_iter()
            .map(|(counterpart_id, last_message_at)| Interaction { counterpart_id, last_message_at })
            .collect())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let before = self.inner.messages.len();
        self.inner.messages.retain(|_, m| m.sender_id != user_id && m.receiver_id != user_id);
        Ok(u64::try_from(before.saturating_sub(self.inner.messages.len())).unwrap_or(0))
    }
}
