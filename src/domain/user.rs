use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_PROFILE_PIC: &str = "https://www.gravatar.com/avatar/?d=mp&f=y";
pub const DEFAULT_BIO: &str = "Hello!";

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_pic: String,
    pub bio: String,
    pub is_verified: bool,
    pub verification_token_hash: Option<String>,
    pub verification_expires_at: Option<OffsetDateTime>,
    pub reset_token_hash: Option<String>,
    pub reset_expires_at: Option<OffsetDateTime>,
    pub is_online: bool,
    pub last_seen: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_pic: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub profile_pic: Option<String>,
    pub bio: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.profile_pic.is_none() && self.bio.is_none()
    }
}

/// Client-facing projection of a [`User`]. Credentials and one-time token
/// digests never leave the server.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub profile_pic: String,
    pub bio: String,
    pub is_verified: bool,
    pub is_online: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            profile_pic: user.profile_pic.clone(),
            bio: user.bio.clone(),
            is_verified: user.is_verified,
            is_online: user.is_online,
            last_seen: user.last_seen,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

/// Normalizes an email the way it is stored: trimmed and lowercase.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
