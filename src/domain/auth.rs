use crate::error::{AppError, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use base64::Engine;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

impl Claims {
    #[must_use]
    pub fn new(user_id: Uuid, ttl_secs: u64) -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let expiration = usize::try_from(now.saturating_add(ttl_secs)).unwrap_or(usize::MAX);

        Self { sub: user_id, exp: expiration }
    }

    /// Signs the claims with HS256.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if encoding fails.
    pub fn encode(&self, secret: &str) -> Result<String> {
        encode(&Header::default(), self, &EncodingKey::from_secret(secret.as_bytes())).map_err(|_| AppError::Internal)
    }

    /// Verifies signature and expiry.
    ///
    /// # Errors
    /// Returns `AppError::Authentication` if the token is invalid or expired.
    pub fn decode(token: &str, secret: &str) -> Result<Self> {
        let token_data = decode::<Self>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
            .map_err(|_| AppError::unauthenticated())?;

        Ok(token_data.claims)
    }
}

#[derive(Debug)]
pub struct Password;

impl Password {
    /// # Errors
    /// Returns `AppError::Internal` if hashing fails.
    #[tracing::instrument(skip(password), level = "debug")]
    pub fn hash(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash =
            argon2.hash_password(password.as_bytes(), &salt).map_err(|_| AppError::Internal)?.to_string();
        Ok(password_hash)
    }

    /// # Errors
    /// Returns `AppError::Internal` if the stored hash cannot be parsed.
    pub fn verify(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AppError::Internal)?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
    }

    /// # Errors
    /// Returns `AppError::Validation` if the password is too short.
    pub fn validate_strength(password: &str) -> Result<()> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        Ok(())
    }
}

/// Random single-use tokens for email verification and password reset.
#[derive(Debug)]
pub struct OpaqueToken;

impl OpaqueToken {
    /// Generates a cryptographically secure random string (32 bytes -> Base64).
    #[must_use]
    pub fn generate() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Hashes a token using SHA-256 for storage.
    #[must_use]
    pub fn hash(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_roundtrip() {
        let user_id = Uuid::new_v4();
        let secret = "test_secret";
        let claims = Claims::new(user_id, 3600);

        let token = claims.encode(secret).unwrap();
        let decoded = Claims::decode(&token, secret).unwrap();

        assert_eq!(claims, decoded);
    }

    #[test]
    fn test_claims_invalid_secret() {
        let claims = Claims::new(Uuid::new_v4(), 3600);
        let token = claims.encode("secret1").unwrap();

        let result = Claims::decode(&token, "secret2");
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }

    #[test]
    fn test_expired_claims_rejected() {
        let claims = Claims { sub: Uuid::new_v4(), exp: 1_000 };
        let token = claims.encode("secret").unwrap();

        assert!(matches!(Claims::decode(&token, "secret"), Err(AppError::Authentication(_))));
    }

    #[test]
    fn test_password_hashing() {
        let password = "password12345";
        let hash = Password::hash(password).unwrap();

        assert_ne!(hash, password);
        assert!(Password::verify(password, &hash).unwrap());
        assert!(!Password::verify("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_password_strength() {
        assert!(Password::validate_strength("12345").is_err());
        assert!(Password::validate_strength("123456").is_ok());
    }

    #[test]
    fn test_opaque_token_generation() {
        let token1 = OpaqueToken::generate();
        let token2 = OpaqueToken::generate();

        assert_ne!(token1, token2);
        assert_eq!(token1.len(), 43); // 32 bytes Base64 no pad
    }

    #[test]
    fn test_opaque_token_hashing() {
        let hash1 = OpaqueToken::hash("my_token");
        let hash2 = OpaqueToken::hash("my_token");

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
