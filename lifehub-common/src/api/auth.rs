//! Bearer token issuing and verification
//!
//! Access and refresh tokens are HS256 JWTs carrying the user id in `sub`
//! and a unique `jti`, so a refresh token can be revoked at logout. The
//! signing secret lives in the settings table and is generated on first
//! start.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::settings::{get_setting, set_setting};
use crate::{Error, Result};

/// Settings key holding the token signing secret
pub const JWT_SECRET_KEY: &str = "jwt_secret";

/// Which half of a token pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by every token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Unique token id
    pub jti: String,
    pub kind: TokenKind,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiry (Unix seconds)
    pub exp: i64,
}

/// Access + refresh token pair returned at login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Issues and verifies tokens with one signing secret
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    /// Sign a single token of the given kind
    pub fn issue(&self, user_id: &str, kind: TokenKind) -> Result<(String, Claims)> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            jti: crate::uuid_utils::generate(),
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, claims))
    }

    /// Sign an access + refresh pair
    pub fn issue_pair(&self, user_id: &str) -> Result<TokenPair> {
        let (access, _) = self.issue(user_id, TokenKind::Access)?;
        let (refresh, _) = self.issue(user_id, TokenKind::Refresh)?;
        Ok(TokenPair { access, refresh })
    }

    /// Verify signature and expiry, and that the token is of the expected kind
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if data.claims.kind != expected {
            return Err(Error::InvalidInput(format!(
                "Expected {:?} token, got {:?}",
                expected, data.claims.kind
            )));
        }
        Ok(data.claims)
    }
}

// ========================================
// Signing secret management
// ========================================

/// Load the signing secret, generating and storing one if missing
pub async fn load_jwt_secret(db: &SqlitePool) -> Result<String> {
    match get_setting(db, JWT_SECRET_KEY).await? {
        Some(secret) if !secret.is_empty() => Ok(secret),
        _ => initialize_jwt_secret(db).await,
    }
}

/// Generate a 256-bit random secret and store it in settings
pub async fn initialize_jwt_secret(db: &SqlitePool) -> Result<String> {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let secret: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

    set_setting(db, JWT_SECRET_KEY, &secret).await?;
    Ok(secret)
}
