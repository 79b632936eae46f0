use crate::adapters::database::{MessageRepository, UserRepository};
use crate::domain::user::UserProfile;
use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Read-side directory of users, shaped for the contacts sidebar.
#[derive(Clone, Debug)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl UserService {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>, messages: Arc<dyn MessageRepository>) -> Self {
        Self { users, messages }
    }

    /// Every user except the caller. Users the caller has talked to come
    /// first, most recent conversation first; the rest follow in signup order.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the directory cannot be loaded.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list_contacts(&self, caller_id: Uuid) -> Result<Vec<UserProfile>> {
        let (users, interactions) =
            tokio::try_join!(self.users.list_except(caller_id), self.messages.latest_interactions(caller_id))?;

        let last_message_at: HashMap<Uuid, _> =
            interactions.into_iter().map(|i| (i.counterpart_id, i.last_message_at)).collect();

        let mut contacts: Vec<_> = users.into_iter().map(|u| (last_message_at.get(&u.id).copied(), u)).collect();
        // Stable sort keeps signup order among equal keys.
        contacts.sort_by(|(a, _), (b, _)| b.cmp(a));

        Ok(contacts.into_iter().map(|(_, user)| UserProfile::from(user)).collect())
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the user does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<UserProfile> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}
