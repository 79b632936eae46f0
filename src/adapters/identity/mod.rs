use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;

pub mod google;

pub use google::GoogleIdentityVerifier;

/// Identity asserted by a federated login provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync + std::fmt::Debug {
    /// Returns `AppError::Authentication` if the provider rejects the token.
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity>;
}

/// Rejects every token. Used when no provider is configured.
#[derive(Debug, Clone, Default)]
pub struct DisabledIdentityVerifier;

#[async_trait]
impl IdentityVerifier for DisabledIdentityVerifier {
    async fn verify(&self, _id_token: &str) -> Result<FederatedIdentity> {
        Err(AppError::Authentication("Federated login is not enabled".to_string()))
    }
}

/// Accepts a fixed set of tokens. Used by tests.
#[derive(Debug, Clone, Default)]
pub struct FixedIdentityVerifier {
    identities: HashMap<String, FederatedIdentity>,
}

impl FixedIdentityVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: &str, identity: FederatedIdentity) -> Self {
        self.identities.insert(token.to_string(), identity);
        self
    }
}

#[async_trait]
impl IdentityVerifier for FixedIdentityVerifier {
    async fn verify(&self, id_token: &str) -> Result<FederatedIdentity> {
        self.identities.get(id_token).cloned().ok_or_else(|| AppError::Authentication("Invalid ID token".to_string()))
    }
}
