use crate::config::AuthConfig;
use crate::domain::auth::{Claims, Password};
use crate::error::{AppError, Result};
use cookie::{Cookie, SameSite};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "token";

/// Issues and verifies stateless session tokens and owns password hashing.
#[derive(Clone, Debug)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    #[must_use]
    pub const fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    fn session_ttl_secs(&self) -> u64 {
        u64::try_from(self.config.session_ttl_days.saturating_mul(86_400)).unwrap_or(0)
    }

    /// # Errors
    /// Returns `AppError::Internal` if hashing fails.
    #[tracing::instrument(err, skip(self, password))]
    pub async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || Password::hash(&password)).await.map_err(|_| AppError::Internal)?
    }

    /// # Errors
    /// Returns `AppError::Internal` if the stored hash is malformed.
    #[tracing::instrument(err, skip(self, password, password_hash))]
    pub async fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool> {
        let password = password.to_string();
        let password_hash = password_hash.to_string();
        tokio::task::spawn_blocking(move || Password::verify(&password, &password_hash))
            .await
            .map_err(|_| AppError::Internal)?
    }

    /// # Errors
    /// Returns `AppError::Internal` if the token cannot be signed.
    pub fn issue_token(&self, user_id: Uuid) -> Result<String> {
        Claims::new(user_id, self.session_ttl_secs()).encode(&self.config.jwt_secret)
    }

    /// # Errors
    /// Returns `AppError::Authentication` if the token is invalid or expired.
    pub fn verify_token(&self, token: &str) -> Result<Uuid> {
        Claims::decode(token, &self.config.jwt_secret).map(|claims| claims.sub)
    }

    #[must_use]
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        let max_age = i64::try_from(self.session_ttl_secs()).unwrap_or(i64::MAX);
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.config.cookie_secure)
            .same_site(SameSite::Strict)
            .max_age(cookie::time::Duration::seconds(max_age))
            .build()
    }

    #[must_use]
    pub fn clear_session_cookie(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .secure(self.config.cookie_secure)
            .same_site(SameSite::Strict)
            .max_age(cookie::time::Duration::ZERO)
            .build()
    }
}
