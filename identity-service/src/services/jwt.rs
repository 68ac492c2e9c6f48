use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::{TokenError, TokenPayload};

/// Minimum HMAC secret length in bytes.
pub const MIN_SECRET_KEY_LEN: usize = 32;

/// Registered claims carried by every JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    /// JWT ID
    jti: String,
    /// Subject (username)
    sub: String,
    /// Issued at (Unix timestamp)
    iat: i64,
    /// Expiration time (Unix timestamp)
    exp: i64,
}

impl From<&TokenPayload> for Claims {
    fn from(payload: &TokenPayload) -> Self {
        Self {
            jti: payload.id.to_string(),
            sub: payload.subject.clone(),
            iat: payload.issued_at,
            exp: payload.expires_at,
        }
    }
}

/// HS256 signed-claims token format.
#[derive(Clone)]
pub struct JwtMaker {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtMaker {
    pub fn new(secret: &[u8]) -> Result<Self, anyhow::Error> {
        if secret.len() < MIN_SECRET_KEY_LEN {
            return Err(anyhow::anyhow!(
                "JWT secret key must be at least {} bytes, got {}",
                MIN_SECRET_KEY_LEN,
                secret.len()
            ));
        }

        // The algorithm is pinned: a header naming anything else (including
        // "none") fails to verify.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    pub fn encode(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            &Claims::from(payload),
            &self.encoding_key,
        )
        .map_err(|e| TokenError::Mint(e.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<TokenPayload, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                kind => {
                    tracing::debug!(reason = ?kind, "JWT rejected");
                    TokenError::Invalid
                }
            }
        })?;

        let claims = data.claims;
        let id = Uuid::parse_str(&claims.jti).map_err(|_| TokenError::Invalid)?;

        let payload = TokenPayload {
            id,
            subject: claims.sub,
            issued_at: claims.iat,
            expires_at: claims.exp,
        };
        // jsonwebtoken still accepts a token in its expiry second.
        payload.check_expiry()?;
        Ok(payload)
    }
}
