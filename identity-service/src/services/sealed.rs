use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use super::token::{TokenError, TokenPayload};

/// Version prefix; also bound into the ciphertext as associated data.
pub const SEALED_HEADER: &str = "v1.sealed.";
pub const SEALED_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Authenticated-encryption token format.
///
/// Layout: `v1.sealed.` + base64url(nonce || ciphertext || tag).
#[derive(Clone)]
pub struct SealedMaker {
    cipher: XChaCha20Poly1305,
}

impl SealedMaker {
    pub fn new(key: &[u8]) -> Result<Self, anyhow::Error> {
        if key.len() != SEALED_KEY_LEN {
            return Err(anyhow::anyhow!(
                "Sealed token key must be exactly {} bytes, got {}",
                SEALED_KEY_LEN,
                key.len()
            ));
        }

        Ok(Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(key)),
        })
    }

    pub fn seal(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        let plaintext = serde_json::to_vec(payload).map_err(|e| TokenError::Mint(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: SEALED_HEADER.as_bytes(),
                },
            )
            .map_err(|e| TokenError::Mint(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", SEALED_HEADER, URL_SAFE_NO_PAD.encode(blob)))
    }

    pub fn open(&self, token: &str) -> Result<TokenPayload, TokenError> {
        let encoded = token
            .strip_prefix(SEALED_HEADER)
            .ok_or(TokenError::Invalid)?;
        let blob = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::Invalid)?;

        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(TokenError::Invalid);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: SEALED_HEADER.as_bytes(),
                },
            )
            .map_err(|_| {
                tracing::debug!("Sealed token failed authentication");
                TokenError::Invalid
            })?;

        let payload: TokenPayload =
            serde_json::from_slice(&plaintext).map_err(|_| TokenError::Invalid)?;
        payload.check_expiry()?;

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_key_must_be_exact_length() {
        assert!(SealedMaker::new(&KEY[..31]).is_err());
        assert!(SealedMaker::new(b"0123456789abcdef0123456789abcdef0").is_err());
        assert!(SealedMaker::new(KEY).is_ok());
    }

    #[test]
    fn test_seal_open() {
        let maker = SealedMaker::new(KEY).unwrap();
        let payload = TokenPayload::new("user123", Duration::minutes(15));

        let token = maker.seal(&payload).unwrap();
        assert!(token.starts_with(SEALED_HEADER));
        assert!(!token.contains("user123"));
        assert_eq!(maker.open(&token).unwrap(), payload);
    }

    #[test]
    fn test_expired() {
        let maker = SealedMaker::new(KEY).unwrap();
        let token = maker
            .seal(&TokenPayload::new("user123", Duration::seconds(-1)))
            .unwrap();

        assert!(matches!(maker.open(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_wrong_key_is_invalid() {
        let maker = SealedMaker::new(KEY).unwrap();
        let other = SealedMaker::new(b"fedcba9876543210fedcba9876543210").unwrap();
        let token = other
            .seal(&TokenPayload::new("user123", Duration::minutes(1)))
            .unwrap();

        assert!(matches!(maker.open(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_flipped_byte_is_invalid() {
        let maker = SealedMaker::new(KEY).unwrap();
        let token = maker
            .seal(&TokenPayload::new("user123", Duration::minutes(1)))
            .unwrap();

        let mut blob = URL_SAFE_NO_PAD
            .decode(token.strip_prefix(SEALED_HEADER).unwrap())
            .unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let tampered = format!("{}{}", SEALED_HEADER, URL_SAFE_NO_PAD.encode(&blob));

        assert!(matches!(maker.open(&tampered), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_header_is_authenticated() {
        let maker = SealedMaker::new(KEY).unwrap();
        let payload = TokenPayload::new("user123", Duration::minutes(1));
        let plaintext = serde_json::to_vec(&payload).unwrap();

        // Same key and a valid frame, but sealed under another header.
        let nonce = [7u8; NONCE_LEN];
        let ciphertext = maker
            .cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: b"v2.sealed.",
                },
            )
            .unwrap();
        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        let token = format!("{}{}", SEALED_HEADER, URL_SAFE_NO_PAD.encode(&blob));

        assert!(matches!(maker.open(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_short_blob_is_invalid() {
        let maker = SealedMaker::new(KEY).unwrap();
        let token = format!("{}{}", SEALED_HEADER, URL_SAFE_NO_PAD.encode([0u8; 20]));

        assert!(matches!(maker.open(&token), Err(TokenError::Invalid)));
    }
}
