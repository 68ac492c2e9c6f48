//! Bearer token minting and verification.
//!
//! `TokenMaker` is a closed set of formats chosen once from configuration:
//! signed claims (JWT, HS256) or an authenticated-encryption blob
//! (XChaCha20-Poly1305). Both carry the same `TokenPayload`.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::jwt::JwtMaker;
use super::sealed::SealedMaker;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Malformed, wrong algorithm, bad signature or MAC.
    #[error("invalid token")]
    Invalid,

    /// Structurally valid but past its expiry.
    #[error("token has expired")]
    Expired,

    #[error("failed to mint token: {0}")]
    Mint(String),
}

/// Claims carried by every bearer token. Times are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub id: Uuid,
    pub subject: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl TokenPayload {
    pub fn new(subject: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            issued_at: now.timestamp(),
            expires_at: (now + ttl).timestamp(),
        }
    }

    pub fn check_expiry(&self) -> Result<(), TokenError> {
        if Utc::now().timestamp() >= self.expires_at {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

/// A freshly minted bearer and the payload it encodes.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub payload: TokenPayload,
}

/// Token format selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScheme {
    Jwt,
    Sealed,
}

impl FromStr for TokenScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jwt" => Ok(TokenScheme::Jwt),
            "sealed" | "paseto" => Ok(TokenScheme::Sealed),
            other => Err(format!("Unknown token scheme: {other} (expected jwt or sealed)")),
        }
    }
}

#[derive(Clone)]
pub enum TokenMaker {
    Signed(JwtMaker),
    Sealed(SealedMaker),
}

impl TokenMaker {
    pub fn new(scheme: TokenScheme, key: &[u8]) -> Result<Self, anyhow::Error> {
        let maker = match scheme {
            TokenScheme::Jwt => TokenMaker::Signed(JwtMaker::new(key)?),
            TokenScheme::Sealed => TokenMaker::Sealed(SealedMaker::new(key)?),
        };
        tracing::info!(scheme = ?scheme, "Token maker initialized");
        Ok(maker)
    }

    pub fn scheme(&self) -> TokenScheme {
        match self {
            TokenMaker::Signed(_) => TokenScheme::Jwt,
            TokenMaker::Sealed(_) => TokenScheme::Sealed,
        }
    }

    /// Mint a short-lived access token for `subject`.
    pub fn mint(&self, subject: &str, ttl: Duration) -> Result<MintedToken, TokenError> {
        let payload = TokenPayload::new(subject, ttl);
        let token = match self {
            TokenMaker::Signed(maker) => maker.encode(&payload)?,
            TokenMaker::Sealed(maker) => maker.seal(&payload)?,
        };
        Ok(MintedToken { token, payload })
    }

    pub fn verify(&self, token: &str) -> Result<TokenPayload, TokenError> {
        match self {
            TokenMaker::Signed(maker) => maker.decode(token),
            TokenMaker::Sealed(maker) => maker.open(token),
        }
    }

    /// Refresh tokens share the access token format and rules; only the
    /// ttl differs.
    pub fn mint_refresh(&self, subject: &str, ttl: Duration) -> Result<MintedToken, TokenError> {
        self.mint(subject, ttl)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.verify(token)
    }
}
