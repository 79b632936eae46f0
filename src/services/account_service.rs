use crate::adapters::database::{MessageRepository, UserRepository};
use crate::adapters::identity::IdentityVerifier;
use crate::adapters::mail::templates::ActionEmail;
use crate::adapters::mail::{EmailMessage, Mailer};
use crate::config::{AuthConfig, MailConfig};
use crate::domain::auth::{OpaqueToken, Password};
use crate::domain::user::{NewUser, ProfileUpdate, User, UserProfile, normalize_email};
use crate::error::{AppError, Result};
use crate::services::auth_service::AuthService;
use crate::services::media_service::{MediaFolder, MediaService};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct AccountMetrics {
    users_registered_total: Counter<u64>,
    login_total: Counter<u64>,
}

impl AccountMetrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            users_registered_total: meter
                .u64_counter("users_registered_total")
                .with_description("Total number of successful user registrations")
                .build(),
            login_total: meter
                .u64_counter("auth_login_total")
                .with_description("Total number of successful logins, by method")
                .build(),
        }
    }
}

/// A freshly authenticated user together with their session token.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Clone, Debug)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    messages: Arc<dyn MessageRepository>,
    auth: AuthService,
    media: MediaService,
    mailer: Arc<dyn Mailer>,
    identity: Arc<dyn IdentityVerifier>,
    verification_ttl: Duration,
    reset_ttl: Duration,
    app_url: String,
    metrics: AccountMetrics,
}

impl AccountService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        messages: Arc<dyn MessageRepository>,
        auth: AuthService,
        media: MediaService,
        mailer: Arc<dyn Mailer>,
        identity: Arc<dyn IdentityVerifier>,
        auth_config: &AuthConfig,
        mail_config: &MailConfig,
    ) -> Self {
        Self {
            users,
            messages,
            auth,
            media,
            mailer,
            identity,
            verification_ttl: Duration::seconds(auth_config.verification_token_ttl_secs),
            reset_ttl: Duration::seconds(auth_config.reset_token_ttl_secs),
            app_url: mail_config.app_url.trim_end_matches('/').to_string(),
            metrics: AccountMetrics::new(),
        }
    }

    /// Creates an account and signs it in. A verification email is sent on a
    /// best-effort basis.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if a field is missing or the password is too short.
    /// Returns `AppError::Conflict` if the email is already registered.
    #[tracing::instrument(
        skip(self, full_name, email, password),
        fields(user_id = tracing::field::Empty),
        err(level = "warn")
    )]
    pub async fn signup(&self, full_name: &str, email: &str, password: &str) -> Result<AuthSession> {
        let full_name = full_name.trim();
        let email = normalize_email(email);
        if full_name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AppError::Validation("All fields are required".to_string()));
        }
        if !email.contains('@') {
            return Err(AppError::Validation("Invalid email address".to_string()));
        }
        Password::validate_strength(password)?;

        let password_hash = self.auth.hash_password(password).await?;
        let user = self
            .users
            .create(NewUser { full_name: full_name.to_string(), email, password_hash, profile_pic: None, is_verified: false })
            .await?;

        tracing::Span::current().record("user_id", tracing::field::display(user.id));
        tracing::info!("User registered successfully");
        self.metrics.users_registered_total.add(1, &[KeyValue::new("method", "password")]);

        if let Err(e) = self.issue_verification(&user).await {
            tracing::warn!(error = %e, "Failed to send verification email after signup");
        }

        self.session_for(user)
    }

    /// # Errors
    /// Returns `AppError::Validation` if a field is missing.
    /// Returns `AppError::Authentication` if the credentials do not match.
    #[tracing::instrument(skip(self, email, password), fields(user_id = tracing::field::Empty), err(level = "warn"))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Validation("Email and password are required".to_string()));
        }

        let invalid = || AppError::Authentication("Invalid email or password".to_string());

        let Some(user) = self.users.find_by_email(&email).await? else {
            tracing::warn!("Login failed: user not found");
            return Err(invalid());
        };
        tracing::Span::current().record("user_id", tracing::field::display(user.id));

        if !self.auth.verify_password(password, &user.password_hash).await? {
            tracing::warn!("Login failed: invalid password");
            return Err(invalid());
        }

        self.metrics.login_total.add(1, &[KeyValue::new("method", "password")]);
        self.session_for(user)
    }

    /// Signs in with a federated ID token, creating the account on first use.
    ///
    /// # Errors
    /// Returns `AppError::Authentication` if the provider rejects the token.
    /// Returns `AppError::Upstream` if the provider cannot be reached.
    #[tracing::instrument(skip(self, id_token), fields(user_id = tracing::field::Empty), err(level = "warn"))]
    pub async fn google(&self, id_token: &str) -> Result<AuthSession> {
        if id_token.trim().is_empty() {
            return Err(AppError::Validation("ID token is required".to_string()));
        }

        let identity = self.identity.verify(id_token.trim()).await?;
        let email = normalize_email(&identity.email);

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                // Federated accounts get a password nobody knows.
                let password_hash = self.auth.hash_password(&OpaqueToken::generate()).await?;
                let created = self
                    .users
                    .create(NewUser {
                        full_name: identity.name,
                        email,
                        password_hash,
                        profile_pic: identity.picture,
                        is_verified: true,
                    })
                    .await?;
                self.metrics.users_registered_total.add(1, &[KeyValue::new("method", "google")]);
                created
            }
        };

        tracing::Span::current().record("user_id", tracing::field::display(user.id));
        self.metrics.login_total.add(1, &[KeyValue::new("method", "google")]);
        self.session_for(user)
    }

    /// # Errors
    /// Returns `AppError::Authentication` if the account no longer exists.
    pub async fn check(&self, user_id: Uuid) -> Result<UserProfile> {
        self.current_user(user_id).await.map(UserProfile::from)
    }

    /// # Errors
    /// Returns `AppError::Validation` if no field is supplied.
    /// Returns `AppError::Upstream` if the avatar upload fails.
    #[tracing::instrument(skip(self, full_name, profile_pic, bio), err(level = "warn"))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        full_name: Option<String>,
        profile_pic: Option<String>,
        bio: Option<String>,
    ) -> Result<UserProfile> {
        let full_name = full_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let bio = bio.map(|b| b.trim().to_string());
        let profile_pic = profile_pic.filter(|p| !p.trim().is_empty());

        if full_name.is_none() && profile_pic.is_none() && bio.is_none() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }

        let profile_pic = match profile_pic {
            Some(payload) => Some(self.media.upload_image(MediaFolder::Avatars, &payload).await?),
            None => None,
        };

        let update = ProfileUpdate { full_name, profile_pic, bio };
        self.users.update_profile(user_id, update).await?.map(UserProfile::from).ok_or_else(AppError::unauthenticated)
    }

    /// Emails a single-use password reset link.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if no account uses the email.
    /// Returns `AppError::Upstream` if the email cannot be delivered.
    #[tracing::instrument(skip(self, email), err(level = "warn"))]
    pub async fn forget(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AppError::Validation("Email is required".to_string()));
        }

        let user =
            self.users.find_by_email(&email).await?.ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let token = OpaqueToken::generate();
        let expires_at = OffsetDateTime::now_utc() + self.reset_ttl;
        self.users.set_reset_token(user.id, &OpaqueToken::hash(&token), expires_at).await?;

        let url = format!("{}/reset/{token}", self.app_url);
        let html = ActionEmail {
            title: "Reset your password",
            name: &user.full_name,
            message: "We received a request to reset your password. The link below can be used once.",
            button_text: "Reset password",
            url: &url,
        }
        .render();

        self.mailer.send(EmailMessage { to: user.email, subject: "Reset your password".to_string(), html }).await
    }

    /// # Errors
    /// Returns `AppError::Validation` if the new password is too short.
    /// Returns `AppError::NotFound` if the token is unknown, used or expired.
    #[tracing::instrument(skip(self, token, password), err(level = "warn"))]
    pub async fn reset(&self, token: &str, password: &str) -> Result<()> {
        Password::validate_strength(password)?;
        let password_hash = self.auth.hash_password(password).await?;

        let user_id = self
            .users
            .consume_reset_token(&OpaqueToken::hash(token), &password_hash, OffsetDateTime::now_utc())
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid or expired reset token".to_string()))?;

        tracing::info!(%user_id, "Password reset");
        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Validation` if the account is already verified.
    /// Returns `AppError::Upstream` if the email cannot be delivered.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn send_verification(&self, user_id: Uuid) -> Result<()> {
        let user = self.current_user(user_id).await?;
        if user.is_verified {
            return Err(AppError::Validation("Email is already verified".to_string()));
        }
        self.issue_verification(&user).await
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the token is unknown, used or expired.
    #[tracing::instrument(skip(self, token), err(level = "warn"))]
    pub async fn verify_email(&self, token: &str) -> Result<UserProfile> {
        self.users
            .consume_verification_token(&OpaqueToken::hash(token), OffsetDateTime::now_utc())
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| AppError::NotFound("Invalid or expired verification token".to_string()))
    }

    /// Removes the account and every message it sent or received.
    ///
    /// # Errors
    /// Returns `AppError::Authentication` if the account no longer exists.
    #[tracing::instrument(skip(self), err(level = "warn"))]
    pub async fn delete_account(&self, user_id: Uuid) -> Result<()> {
        let removed = self.messages.delete_all_for_user(user_id).await?;
        if !self.users.delete(user_id).await? {
            return Err(AppError::unauthenticated());
        }
        tracing::info!(messages_removed = removed, "Account deleted");
        Ok(())
    }

    async fn current_user(&self, user_id: Uuid) -> Result<User> {
        self.users.find_by_id(user_id).await?.ok_or_else(AppError::unauthenticated)
    }

    async fn issue_verification(&self, user: &User) -> Result<()> {
        let token = OpaqueToken::generate();
        let expires_at = OffsetDateTime::now_utc() + self.verification_ttl;
        self.users.set_verification_token(user.id, &OpaqueToken::hash(&token), expires_at).await?;

        let url = format!("{}/verify-email?token={token}", self.app_url);
        let html = ActionEmail {
            title: "Verify your email",
            name: &user.full_name,
            message: "Confirm your email address to finish setting up your account.",
            button_text: "Verify email",
            url: &url,
        }
        .render();

        self.mailer.send(EmailMessage { to: user.email.clone(), subject: "Verify your email".to_string(), html }).await
    }

    fn session_for(&self, user: User) -> Result<AuthSession> {
        let token = self.auth.issue_token(user.id)?;
        Ok(AuthSession { user: UserProfile::from(user), token })
    }
}
