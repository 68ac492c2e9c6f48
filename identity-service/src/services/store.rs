//! Storage contracts for identities and sessions.
//!
//! `Store` is the pool-level handle; `StoreTx` is a unit of work opened with
//! `Store::begin`. Nothing written through a `StoreTx` is visible to other
//! callers until `commit`; dropping it without committing rolls back.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Identity, Session};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Zero rows matched a mutation, or a required row is missing.
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Backend(anyhow::Error::new(other)),
        }
    }
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    async fn get_identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    async fn get_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Deletes the identity and, by cascade, its sessions.
    async fn delete_identity(&self, id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_session_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    async fn get_session_by_token_hash(&self, token_hash: &str)
        -> Result<Option<Session>, StoreError>;

    async fn get_sessions_by_owner(&self, identity_id: Uuid) -> Result<Vec<Session>, StoreError>;

    /// Overwrite `expires_at` and `revoked`. A revoked row is never reopened.
    async fn update_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Revoke one live session. `NotFound` when it is missing or already revoked.
    async fn revoke_session(&self, id: Uuid) -> Result<(), StoreError>;

    /// Revoke every live session of an owner, returning how many flipped.
    /// `NotFound` when none did.
    async fn revoke_sessions_by_owner(&self, identity_id: Uuid) -> Result<u64, StoreError>;

    /// Delete sessions with `expires_at <= now` (epoch seconds), revoked or not.
    async fn delete_expired_sessions(&self, now: i64) -> Result<u64, StoreError>;

    async fn delete_session(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Writes that must happen atomically.
#[async_trait]
pub trait StoreTx: Send {
    async fn create_identity(&mut self, identity: &Identity) -> Result<(), StoreError>;

    async fn create_session(&mut self, session: &Session) -> Result<(), StoreError>;

    /// Conditionally revoke a session: only a row that is still live is
    /// touched. Returns rows affected (0 or 1).
    async fn claim_session(&mut self, id: Uuid, now: i64) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: IdentityStore + SessionStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
