use crate::adapters::identity::{FederatedIdentity, IdentityVerifier};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    email_verified: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// Verifies Google ID tokens against the `tokeninfo` endpoint and checks the
/// audience matches our OAuth client id.
#[derive(Debug, Clone)]
pub struct GoogleIdentityVerifier {
    client: reqwest::Client,
    client_id: String,
    endpoint: String,
}

impl GoogleIdentityVerifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(client_id: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, client_id, endpoint: TOKENINFO_URL.to_string() })
    }

    fn identity_from(&self, info: TokenInfo) -> Result<FederatedIdentity> {
        if info.aud != self.client_id {
            tracing::warn!(aud = %info.aud, "ID token issued for a different audience");
            return Err(AppError::Authentication("Invalid ID token".to_string()));
        }
        if info.email_verified.as_deref() != Some("true") {
            return Err(AppError::Authentication("Google account email is not verified".to_string()));
        }
        let email = info.email.ok_or_else(|| AppError::Authentication("ID token carries no email".to_string()))?;
        let name = info.name.unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(FederatedIdentity { email, name, picture: info.picture })
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    #[tracing::instrument(skip(self, id_token), err(level = "warn"))]
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity> {
        // JWTs are dot-separated base64url segments
        if id_token.is_empty() || !id_token.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
            return Err(AppError::Authentication("Invalid ID token".to_string()));
        }

        let response = self
            .client
            .get(format!("{}?id_token={id_token}", self.endpoint))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Google tokeninfo request failed: {e}")))?;

        if response.status().is_client_error() {
            return Err(AppError::Authentication("Invalid ID token".to_string()));
        }
        if !response.status().is_success() {
            return Err(AppError::Upstream(format!("Google tokeninfo returned {}", response.status())));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed tokeninfo response: {e}")))?;

        self.identity_from(info)
    }
}
