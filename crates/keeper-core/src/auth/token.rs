//! HS256 bearer tokens: `header.claims.signature` with
//! `{user_id, username, exp, iat}` claims.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;

/// Tolerated clock drift for `iat`.
const IAT_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

/// Resolved caller identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Distinguishable credential failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("missing credential")]
    Missing,
    #[error("invalid credential: {0}")]
    Invalid(String),
    #[error("credential expired")]
    Expired,
}

impl From<TokenError> for Error {
    fn from(error: TokenError) -> Self {
        Self::Unauthorized(error.to_string())
    }
}

/// Resolves a bearer credential to the identity it was issued for.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, TokenError>;
}

/// Issues and verifies HS256 tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenSigner")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> crate::Result<Self> {
        if secret.is_empty() {
            return Err(Error::validation("token secret must not be empty"));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        })
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `user_id`, returning it with its expiry.
    pub fn issue(&self, user_id: &str, username: &str) -> crate::Result<(String, DateTime<Utc>)> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            user_id: user_id.to_string(),
            username: username.to_string(),
            exp: now.saturating_add(ttl),
            iat: now,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|error| Error::Unauthorized(format!("failed to sign token: {error}")))?;
        Ok((token, claims.expires_at()))
    }

    pub fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|error| match error.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(error.to_string()),
            })?
            .claims;

        if claims.iat > Utc::now().timestamp().saturating_add(IAT_SKEW_SECS) {
            return Err(TokenError::Invalid("token `iat` is in the future".to_string()));
        }
        if claims.user_id.trim().is_empty() {
            return Err(TokenError::Invalid("token subject is missing".to_string()));
        }
        Ok(claims)
    }
}

impl IdentityVerifier for TokenSigner {
    fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let claims = self.decode_claims(token)?;
        Ok(Identity {
            user_id: claims.user_id,
            username: claims.username,
        })
    }
}

/// Read a token's claims without checking its signature.
///
/// Clients use this to learn their own identity; never use it to authorize.
pub fn peek_claims(token: &str) -> Result<Claims, TokenError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Missing);
    }

    let mut parts = token.split('.');
    let (Some(_header), Some(claims), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Invalid(
            "token must have three dot-separated parts".to_string(),
        ));
    };

    let raw = URL_SAFE_NO_PAD
        .decode(claims.trim_end_matches('='))
        .map_err(|error| TokenError::Invalid(format!("claims are not base64url: {error}")))?;
    serde_json::from_slice(&raw)
        .map_err(|error| TokenError::Invalid(format!("claims are not valid JSON: {error}")))
}
