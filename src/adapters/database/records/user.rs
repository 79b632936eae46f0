use crate::domain::user::User;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) full_name: String,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) profile_pic: String,
    pub(crate) bio: String,
    pub(crate) is_verified: bool,
    pub(crate) verification_token_hash: Option<String>,
    pub(crate) verification_expires_at: Option<OffsetDateTime>,
    pub(crate) reset_token_hash: Option<String>,
    pub(crate) reset_expires_at: Option<OffsetDateTime>,
    pub(crate) is_online: bool,
    pub(crate) last_seen: OffsetDateTime,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            full_name: record.full_name,
            email: record.email,
            password_hash: record.password_hash,
            profile_pic: record.profile_pic,
            bio: record.bio,
            is_verified: record.is_verified,
            verification_token_hash: record.verification_token_hash,
            verification_expires_at: record.verification_expires_at,
            reset_token_hash: record.reset_token_hash,
            reset_expires_at: record.reset_expires_at,
            is_online: record.is_online,
            last_seen: record.last_seen,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
