//! In-memory store with the same constraints as the Postgres schema.
//!
//! A transaction holds the state lock from `begin` until `commit` or
//! `rollback`, and works on a private copy, so concurrent transactions are
//! serialized and uncommitted writes are never visible.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{IdentityStore, SessionStore, Store, StoreError, StoreTx};
use crate::models::{Identity, Session};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    identities: HashMap<Uuid, Identity>,
    sessions: HashMap<Uuid, Session>,
}

impl MemoryState {
    fn insert_identity(&mut self, identity: &Identity) -> Result<(), StoreError> {
        for existing in self.identities.values() {
            if existing.id == identity.id {
                return Err(unique("identities_pkey"));
            }
            if existing.email == identity.email {
                return Err(unique("identities_email_key"));
            }
            if existing.username == identity.username {
                return Err(unique("identities_username_key"));
            }
        }
        self.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    fn insert_session(&mut self, session: &Session) -> Result<(), StoreError> {
        if !self.identities.contains_key(&session.identity_id) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "sessions_identity_id_fkey: identity {} does not exist",
                session.identity_id
            )));
        }
        for existing in self.sessions.values() {
            if existing.id == session.id {
                return Err(unique("sessions_pkey"));
            }
            if existing.token_hash == session.token_hash {
                return Err(unique("sessions_token_hash_key"));
            }
        }
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn claim_session(&mut self, id: Uuid, now: i64) -> u64 {
        match self.sessions.get_mut(&id) {
            Some(session) if !session.revoked && session.expires_at > now => {
                session.revoked = true;
                session.updated_at = Utc::now().timestamp_millis();
                1
            }
            _ => 0,
        }
    }
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

/// Store backed by process memory. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_session_inserts: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent session insert fail with a backend error.
    pub fn fail_session_inserts(&self, fail: bool) {
        self.fail_session_inserts.store(fail, Ordering::SeqCst);
    }

    pub async fn identity_count(&self) -> usize {
        self.state.lock().await.identities.len()
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    fn injected_failure(&self) -> Result<(), StoreError> {
        if self.fail_session_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected session insert failure"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.state.lock().await.insert_identity(identity)
    }

    async fn get_identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.state.lock().await.identities.get(&id).cloned())
    }

    async fn get_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .identities
            .values()
            .find(|identity| identity.email.as_str() == email)
            .cloned())
    }

    async fn delete_identity(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.identities.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        state.sessions.retain(|_, session| session.identity_id != id);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        self.injected_failure()?;
        self.state.lock().await.insert_session(session)
    }

    async fn get_session_by_id(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.state.lock().await.sessions.get(&id).cloned())
    }

    async fn get_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .find(|session| session.token_hash == token_hash)
            .cloned())
    }

    async fn get_sessions_by_owner(&self, identity_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|session| session.identity_id == identity_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .sessions
            .get_mut(&session.id)
            .ok_or(StoreError::NotFound)?;
        stored.expires_at = session.expires_at;
        stored.revoked = stored.revoked || session.revoked;
        stored.updated_at = Utc::now().timestamp_millis();
        Ok(())
    }

    async fn revoke_session(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&id) {
            Some(session) if !session.revoked => {
                session.revoked = true;
                session.updated_at = Utc::now().timestamp_millis();
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn revoke_sessions_by_owner(&self, identity_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now().timestamp_millis();
        let mut revoked = 0;
        for session in state.sessions.values_mut() {
            if session.identity_id == identity_id && !session.revoked {
                session.revoked = true;
                session.updated_at = now;
                revoked += 1;
            }
        }
        if revoked == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(revoked)
    }

    async fn delete_expired_sessions(&self, now: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .sessions
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryStoreTx {
            guard,
            working,
            fail_session_inserts: self.fail_session_inserts.clone(),
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct MemoryStoreTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_session_inserts: Arc<AtomicBool>,
}

#[async_trait]
impl StoreTx for MemoryStoreTx {
    async fn create_identity(&mut self, identity: &Identity) -> Result<(), StoreError> {
        self.working.insert_identity(identity)
    }

    async fn create_session(&mut self, session: &Session) -> Result<(), StoreError> {
        if self.fail_session_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected session insert failure"
            )));
        }
        self.working.insert_session(session)
    }

    async fn claim_session(&mut self, id: Uuid, now: i64) -> Result<u64, StoreError> {
        Ok(self.working.claim_session(id, now))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryStoreTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
