//! Auth orchestrator: register, login, refresh rotation and revocation.

use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::context::{RequestContext, ServiceContext};
use super::error::AuthError;
use super::store::{Store, StoreError, StoreTx};
use super::token::{MintedToken, TokenMaker};
use crate::models::{Identity, Session};
use crate::utils::{validate_login, validate_registration, CredentialHasher, Password, ValidationError};

/// Token lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }
}

/// Access and refresh bearers issued together.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub access_token_expires_at: i64,
    pub refresh_token: String,
    pub refresh_token_expires_at: i64,
}

impl TokenPair {
    fn new(access: MintedToken, refresh: MintedToken) -> Self {
        Self {
            access_token: access.token,
            access_token_expires_at: access.payload.expires_at,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.payload.expires_at,
        }
    }
}

/// Result of register and login.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub identity: Identity,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: TokenMaker,
    settings: SessionSettings,
    context: ServiceContext,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: TokenMaker,
        settings: SessionSettings,
        context: ServiceContext,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            settings,
            context,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn token_maker(&self) -> &TokenMaker {
        &self.tokens
    }

    /// Create an identity and its first session.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        const OP: &str = "register";
        self.enter(ctx, OP)?;

        async {
            validate_registration(email, username, password)?;

            let digest = ctx
                .run(self.hasher.hash(&Password::new(password)))
                .await?
                .map_err(|e| AuthError::internal(OP, e))?;
            let identity = Identity::new(email, username, &digest)?;

            let tokens = self.tokens.clone();
            let settings = self.settings;
            let new_identity = identity.clone();
            let pair = self
                .with_transaction(ctx, OP, move |tx| {
                    Box::pin(async move {
                        tx.create_identity(&new_identity)
                            .await
                            .map_err(|e| AuthError::from_store(OP, e))?;

                        let (pair, session) = issue_pair(&tokens, &settings, &new_identity)?;
                        tx.create_session(&session)
                            .await
                            .map_err(|e| AuthError::from_store(OP, e))?;
                        Ok(pair)
                    })
                })
                .await?;

            tracing::info!(identity_id = %identity.id, "Identity registered");
            Ok(AuthSession {
                identity,
                tokens: pair,
            })
        }
        .instrument(self.context.span(OP))
        .await
    }

    /// Exchange credentials for a new session. Every lookup or password
    /// failure is reported as the same `InvalidCredentials`.
    pub async fn login(
        &self,
        ctx: &RequestContext,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        const OP: &str = "login";
        self.enter(ctx, OP)?;

        async {
            validate_login(email, password)?;

            let identity = match ctx.run(self.store.get_identity_by_email(email)).await? {
                Ok(Some(identity)) => identity,
                Ok(None) => return Err(AuthError::InvalidCredentials),
                Err(e) => {
                    tracing::warn!(error = %e, "Identity lookup failed during login");
                    return Err(AuthError::InvalidCredentials);
                }
            };

            let matches = ctx
                .run(
                    self.hasher
                        .verify(&Password::new(password), identity.password_hash.as_str()),
                )
                .await?
                .unwrap_or_else(|e| {
                    tracing::warn!(identity_id = %identity.id, error = %e, "Stored digest unusable");
                    false
                });
            if !matches {
                return Err(AuthError::InvalidCredentials);
            }

            let (pair, session) = issue_pair(&self.tokens, &self.settings, &identity)?;
            self.store_call(ctx, OP, self.store.create_session(&session))
                .await?;

            tracing::info!(identity_id = %identity.id, "Login succeeded");
            Ok(AuthSession {
                identity,
                tokens: pair,
            })
        }
        .instrument(self.context.span(OP))
        .await
    }

    /// Rotate a refresh token. The presented session is claimed and its
    /// successor inserted in one transaction; of two concurrent refreshes
    /// with the same bearer, only one can claim it.
    pub async fn refresh(
        &self,
        ctx: &RequestContext,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        const OP: &str = "refresh";
        self.enter(ctx, OP)?;

        async {
            if refresh_token.is_empty() {
                return Err(ValidationError::RefreshTokenRequired.into());
            }

            self.tokens.verify_refresh(refresh_token).map_err(|e| {
                tracing::debug!(error = %e, "Refresh token rejected");
                AuthError::InvalidToken
            })?;

            let token_hash = Session::hash_token(refresh_token);
            let session = self
                .store_call(ctx, OP, self.store.get_session_by_token_hash(&token_hash))
                .await?
                .ok_or(AuthError::InvalidToken)?;
            session.check_valid()?;

            let identity = self
                .store_call(ctx, OP, self.store.get_identity_by_id(session.identity_id))
                .await?
                .ok_or(AuthError::NotFoundIdentity)?;

            let access = self
                .tokens
                .mint(identity.username.as_str(), self.settings.access_ttl)?;

            let tokens = self.tokens.clone();
            let refresh_ttl = self.settings.refresh_ttl;
            let subject = identity.username.as_str().to_string();
            let (old_id, owner_id) = (session.id, session.identity_id);
            let refresh = self
                .with_transaction(ctx, OP, move |tx| {
                    Box::pin(async move {
                        let claimed = tx
                            .claim_session(old_id, Utc::now().timestamp())
                            .await
                            .map_err(|e| AuthError::from_store(OP, e))?;
                        if claimed == 0 {
                            tracing::warn!(session_id = %old_id, "Refresh token already consumed");
                            return Err(AuthError::InvalidToken);
                        }

                        let refresh = tokens.mint_refresh(&subject, refresh_ttl)?;
                        let successor = Session::new(
                            owner_id,
                            Session::hash_token(&refresh.token),
                            refresh.payload.expires_at,
                        )?;
                        tx.create_session(&successor)
                            .await
                            .map_err(|e| AuthError::from_store(OP, e))?;
                        Ok(refresh)
                    })
                })
                .await?;

            tracing::info!(identity_id = %identity.id, "Refresh token rotated");
            Ok(TokenPair::new(access, refresh))
        }
        .instrument(self.context.span(OP))
        .await
    }

    /// Revoke the session behind one refresh token.
    pub async fn revoke_token(
        &self,
        ctx: &RequestContext,
        refresh_token: &str,
    ) -> Result<(), AuthError> {
        const OP: &str = "revoke_token";
        self.enter(ctx, OP)?;

        async {
            if refresh_token.is_empty() {
                return Err(ValidationError::RefreshTokenRequired.into());
            }

            let token_hash = Session::hash_token(refresh_token);
            let session = self
                .store_call(ctx, OP, self.store.get_session_by_token_hash(&token_hash))
                .await?
                .ok_or(AuthError::InvalidToken)?;

            match ctx.run(self.store.revoke_session(session.id)).await? {
                Ok(()) => {}
                Err(StoreError::NotFound) => return Err(AuthError::InvalidToken),
                Err(e) => return Err(AuthError::from_store(OP, e)),
            }

            tracing::info!(session_id = %session.id, "Session revoked");
            Ok(())
        }
        .instrument(self.context.span(OP))
        .await
    }

    /// Revoke every live session of an identity. Returns how many were
    /// revoked; an identity with none is not an error.
    pub async fn revoke_all_user_tokens(
        &self,
        ctx: &RequestContext,
        identity_id: &str,
    ) -> Result<u64, AuthError> {
        const OP: &str = "revoke_all_user_tokens";
        self.enter(ctx, OP)?;

        async {
            let identity_id = parse_identity_id(identity_id)?;

            let revoked = match ctx.run(self.store.revoke_sessions_by_owner(identity_id)).await? {
                Ok(count) => count,
                Err(StoreError::NotFound) => 0,
                Err(e) => return Err(AuthError::from_store(OP, e)),
            };

            tracing::info!(%identity_id, revoked, "Sessions revoked for identity");
            Ok(revoked)
        }
        .instrument(self.context.span(OP))
        .await
    }

    /// Delete every session whose expiry has passed.
    pub async fn cleanup_expired_tokens(&self, ctx: &RequestContext) -> Result<u64, AuthError> {
        const OP: &str = "cleanup_expired_tokens";
        self.enter(ctx, OP)?;

        async {
            let removed = self
                .store_call(
                    ctx,
                    OP,
                    self.store.delete_expired_sessions(Utc::now().timestamp()),
                )
                .await?;

            if removed > 0 {
                tracing::info!(removed, "Expired sessions deleted");
            } else {
                tracing::debug!("No expired sessions to delete");
            }
            Ok(removed)
        }
        .instrument(self.context.span(OP))
        .await
    }

    /// Remove an identity together with all of its sessions.
    pub async fn delete_identity(
        &self,
        ctx: &RequestContext,
        identity_id: &str,
    ) -> Result<(), AuthError> {
        const OP: &str = "delete_identity";
        self.enter(ctx, OP)?;

        async {
            let identity_id = parse_identity_id(identity_id)?;

            match ctx.run(self.store.delete_identity(identity_id)).await? {
                Ok(()) => {}
                Err(StoreError::NotFound) => return Err(AuthError::NotFoundIdentity),
                Err(e) => return Err(AuthError::from_store(OP, e)),
            }

            tracing::info!(%identity_id, "Identity deleted");
            Ok(())
        }
        .instrument(self.context.span(OP))
        .await
    }

    /// Run `work` inside one store transaction. Commits only when `work`
    /// returns `Ok` and the request is still live; every other outcome,
    /// cancellation included, rolls back.
    pub async fn with_transaction<T, F>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        work: F,
    ) -> Result<T, AuthError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Box<dyn StoreTx>) -> BoxFuture<'t, Result<T, AuthError>> + Send,
    {
        let mut tx = self.store_call(ctx, operation, self.store.begin()).await?;

        let outcome = match ctx.run(work(&mut tx)).await {
            Ok(result) => result.and_then(|value| ctx.check().map(|()| value)),
            Err(interrupted) => Err(interrupted),
        };

        match outcome {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| AuthError::from_store(operation, e))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        operation,
                        error = %rollback_err,
                        "Transaction rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    fn enter(&self, ctx: &RequestContext, operation: &'static str) -> Result<(), AuthError> {
        ctx.check()?;
        self.context.admit(operation)
    }

    async fn store_call<T, F>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        fut: F,
    ) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        ctx.run(fut)
            .await?
            .map_err(|e| AuthError::from_store(operation, e))
    }
}

fn parse_identity_id(raw: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidIdentityId.into())
}

/// Mint an access and refresh token for `identity` and build the session
/// that records the refresh token.
fn issue_pair(
    tokens: &TokenMaker,
    settings: &SessionSettings,
    identity: &Identity,
) -> Result<(TokenPair, Session), AuthError> {
    let subject = identity.username.as_str();
    let access = tokens.mint(subject, settings.access_ttl)?;
    let refresh = tokens.mint_refresh(subject, settings.refresh_ttl)?;
    let session = Session::new(
        identity.id,
        Session::hash_token(&refresh.token),
        refresh.payload.expires_at,
    )?;
    Ok((TokenPair::new(access, refresh), session))
}
