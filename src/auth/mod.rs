use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config;

/// Sentinel cookie value written on logout; never accepted as a token.
pub const LOGOUT_SENTINEL: &str = "loggedout";

/// Skew subtracted when stamping a password change so a token issued in the
/// same instant does not get invalidated by clock granularity.
pub const PASSWORD_CHANGE_SKEW_SECS: i64 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id the session belongs to.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        Self {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + Duration::hours(expiry_hours as i64)).timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("Token generation failed: {0}")]
    TokenGeneration(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

pub fn sign_token(user_id: Uuid) -> Result<String, AuthError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    encode(
        &Header::default(),
        &Claims::new(user_id),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

pub fn verify_token(token: &str) -> Result<Claims, AuthError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::InvalidToken)
}

/// Slow one-way hash for stored credentials.
pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    bcrypt::hash(plain, config::config().security.bcrypt_cost)
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

pub fn verify_password(candidate: &str, stored_hash: &str) -> bool {
    bcrypt::verify(candidate, stored_hash).unwrap_or(false)
}

/// A freshly minted reset token: the plaintext goes out by email, only the
/// digest is persisted.
pub struct ResetToken {
    pub plaintext: String,
    pub digest: String,
}

pub fn generate_reset_token() -> ResetToken {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);
    let digest = digest_reset_token(&plaintext);
    ResetToken { plaintext, digest }
}

/// One-way digest used to look a reset token back up.
pub fn digest_reset_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let user_id = Uuid::new_v4();
        let token = sign_token(user_id).unwrap();
        let claims = verify_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_tokens_fail() {
        let token = sign_token(Uuid::new_v4()).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert!(verify_token(&tampered).is_err());
        assert!(verify_token("not-a-token").is_err());
    }

    #[test]
    fn password_hash_verifies_and_hides_plaintext() {
        let hash = hash_password("correct horse").unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn reset_token_digest_is_stable_and_one_way() {
        let token = generate_reset_token();
        assert_eq!(token.plaintext.len(), 64); // 32 bytes hex encoded
        assert_eq!(digest_reset_token(&token.plaintext), token.digest);
        assert_ne!(token.plaintext, token.digest);

        // Two tokens never collide in practice.
        assert_ne!(generate_reset_token().digest, token.digest);
    }
}
