//! Session token service
//!
//! Issues and validates signed, time-limited session tokens (HS256) and
//! keeps the revoked-token set in Redis. Tokens are stateless: validity is
//! the signature plus the embedded expiry, so revocation before natural
//! expiry goes through the blacklist checked by the authorization gate.

use anyhow::Result;
use common::cache::RedisPool;
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Token signing configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared secret for signing and verifying tokens
    pub secret: String,
    /// Session token lifetime in seconds (default: 24 hours)
    pub session_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: signing secret (required; there is deliberately no
    ///   built-in fallback)
    /// - `SESSION_TOKEN_EXPIRY`: session token lifetime in seconds
    ///   (default: 86400)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

        if secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let session_token_expiry = std::env::var("SESSION_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86400);

        Ok(JwtConfig {
            secret,
            session_token_expiry,
        })
    }
}

/// Identity claims carried by a session token
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// User email at issuance time
    pub email: String,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// Why a token failed validation. Callers treat every kind as
/// "unauthenticated"; the distinction exists for logging and tests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature mismatch")]
    SignatureMismatch,
    #[error("malformed token")]
    Malformed,
}

/// Token service
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    session_token_expiry: u64,
}

impl TokenService {
    /// Initialize the token service from its configuration
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        TokenService {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            session_token_expiry: config.session_token_expiry,
        }
    }

    /// Issue a signed token for the given identity with the given lifetime
    pub fn issue(&self, user_id: Uuid, email: &str, ttl_seconds: u64) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
            .as_secs();

        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a token's signature and expiry, returning its claims
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
                _ => TokenError::Malformed,
            })
    }

    /// Check whether a token has been revoked
    pub async fn is_token_blacklisted(&self, redis_pool: &RedisPool, token: &str) -> Result<bool> {
        let key = format!("blacklisted_token:{}", token);
        redis_pool.exists(&key).await
    }

    /// Revoke a token for the remainder of its lifetime
    pub async fn blacklist_token(
        &self,
        redis_pool: &RedisPool,
        token: &str,
        remaining_seconds: u64,
    ) -> Result<()> {
        // A TTL of zero would mean "no expiry" to Redis.
        let ttl = remaining_seconds.max(1);
        let key = format!("blacklisted_token:{}", token);
        redis_pool.set(&key, "1", Some(ttl)).await
    }

    /// Configured session token lifetime in seconds
    pub fn session_token_expiry(&self) -> u64 {
        self.session_token_expiry
    }
}
