//! Session model - one outstanding refresh token.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// Why a session cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionRejection {
    #[error("session is malformed")]
    Invalid,

    #[error("session has been revoked")]
    Revoked,

    #[error("session has expired")]
    Expired,
}

/// Session entity. `expires_at` is epoch seconds; `created_at`/`updated_at`
/// are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub token_hash: String,
    pub expires_at: i64,
    pub revoked: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    /// Create a live session for `identity_id`.
    pub fn new(
        identity_id: Uuid,
        token_hash: String,
        expires_at: i64,
    ) -> Result<Self, SessionRejection> {
        if identity_id.is_nil() || token_hash.is_empty() {
            return Err(SessionRejection::Invalid);
        }
        if expires_at <= Utc::now().timestamp() {
            return Err(SessionRejection::Expired);
        }

        let now = Utc::now().timestamp_millis();
        Ok(Self {
            id: Uuid::new_v4(),
            identity_id,
            token_hash,
            expires_at,
            revoked: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// SHA-256 hex digest of a bearer string. Only this is ever persisted.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check usability at `now` (epoch seconds). Revocation is reported
    /// ahead of expiry.
    pub fn check_valid_at(&self, now: i64) -> Result<(), SessionRejection> {
        if self.id.is_nil() || self.identity_id.is_nil() || self.token_hash.is_empty() {
            return Err(SessionRejection::Invalid);
        }
        if self.revoked {
            return Err(SessionRejection::Revoked);
        }
        if self.is_expired_at(now) {
            return Err(SessionRejection::Expired);
        }
        Ok(())
    }

    pub fn check_valid(&self) -> Result<(), SessionRejection> {
        self.check_valid_at(Utc::now().timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    pub fn is_valid(&self) -> bool {
        self.check_valid().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_session() -> Session {
        Session::new(
            Uuid::new_v4(),
            Session::hash_token("token_abc"),
            Utc::now().timestamp() + 3600,
        )
        .unwrap()
    }

    #[test]
    fn test_session_creation() {
        let session = live_session();

        assert!(!session.revoked);
        assert!(session.is_valid());
        assert_ne!(session.token_hash, "token_abc");
        assert_eq!(session.token_hash.len(), 64);
    }

    #[test]
    fn test_hash_token_is_deterministic() {
        assert_eq!(Session::hash_token("abc"), Session::hash_token("abc"));
        assert_ne!(Session::hash_token("abc"), Session::hash_token("abd"));
    }

    #[test]
    fn test_construction_rejections() {
        let future = Utc::now().timestamp() + 60;

        assert_eq!(
            Session::new(Uuid::nil(), "hash".to_string(), future).unwrap_err(),
            SessionRejection::Invalid
        );
        assert_eq!(
            Session::new(Uuid::new_v4(), String::new(), future).unwrap_err(),
            SessionRejection::Invalid
        );
        assert_eq!(
            Session::new(Uuid::new_v4(), "hash".to_string(), Utc::now().timestamp() - 1)
                .unwrap_err(),
            SessionRejection::Expired
        );
    }

    #[test]
    fn test_revoked_takes_precedence_over_expired() {
        let mut session = live_session();
        session.revoked = true;
        session.expires_at = Utc::now().timestamp() - 10;

        assert_eq!(session.check_valid(), Err(SessionRejection::Revoked));
    }

    #[test]
    fn test_expired_session_is_invalid_even_if_not_revoked() {
        let mut session = live_session();
        session.expires_at = Utc::now().timestamp() - 10;

        assert!(!session.revoked);
        assert_eq!(session.check_valid(), Err(SessionRejection::Expired));
    }

    #[test]
    fn test_expiry_boundary() {
        let session = live_session();
        assert!(session.check_valid_at(session.expires_at - 1).is_ok());
        assert_eq!(
            session.check_valid_at(session.expires_at),
            Err(SessionRejection::Expired)
        );
    }
}
