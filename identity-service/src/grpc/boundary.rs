//! Status-returning facade over `AuthService`.
//!
//! Every call gets a fresh `RequestContext` carrying the configured
//! deadline, and a panic inside one call is turned into an `INTERNAL`
//! status for that call only.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tonic::Status;
use tracing::instrument;

use super::error_mapper::to_status;
use crate::dtos::auth::{
    AckResponse, AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, RevokeAllRequest,
    RevokeRequest, TokenResponse,
};
use crate::services::{AuthError, AuthService, RequestContext};

#[derive(Clone)]
pub struct AuthBoundary {
    auth: AuthService,
    request_timeout: Option<Duration>,
}

impl AuthBoundary {
    pub fn new(auth: AuthService, request_timeout: Option<Duration>) -> Self {
        Self {
            auth,
            request_timeout,
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    fn context(&self) -> RequestContext {
        match self.request_timeout {
            Some(timeout) => RequestContext::with_timeout(timeout),
            None => RequestContext::background(),
        }
    }

    #[instrument(skip_all, fields(method = "Register"))]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, Status> {
        let ctx = self.context();
        guarded("register", async {
            self.auth
                .register(&ctx, &req.email, &req.username, &req.password)
                .await
                .map(AuthResponse::from)
        })
        .await
    }

    #[instrument(skip_all, fields(method = "Login"))]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, Status> {
        let ctx = self.context();
        guarded("login", async {
            self.auth
                .login(&ctx, &req.email, &req.password)
                .await
                .map(AuthResponse::from)
        })
        .await
    }

    #[instrument(skip_all, fields(method = "RefreshToken"))]
    pub async fn refresh_token(&self, req: RefreshRequest) -> Result<TokenResponse, Status> {
        let ctx = self.context();
        guarded("refresh", async {
            self.auth
                .refresh(&ctx, &req.refresh_token)
                .await
                .map(TokenResponse::from)
        })
        .await
    }

    #[instrument(skip_all, fields(method = "RevokeToken"))]
    pub async fn revoke_token(&self, req: RevokeRequest) -> Result<AckResponse, Status> {
        let ctx = self.context();
        guarded("revoke_token", async {
            self.auth
                .revoke_token(&ctx, &req.refresh_token)
                .await
                .map(|()| AckResponse::ok())
        })
        .await
    }

    #[instrument(skip_all, fields(method = "RevokeAllUserTokens"))]
    pub async fn revoke_all_user_tokens(
        &self,
        req: RevokeAllRequest,
    ) -> Result<AckResponse, Status> {
        let ctx = self.context();
        guarded("revoke_all_user_tokens", async {
            self.auth
                .revoke_all_user_tokens(&ctx, &req.identity_id)
                .await
                .map(AckResponse::with_count)
        })
        .await
    }

    #[instrument(skip_all, fields(method = "CleanupExpiredTokens"))]
    pub async fn cleanup_expired_tokens(&self) -> Result<AckResponse, Status> {
        let ctx = self.context();
        guarded("cleanup_expired_tokens", async {
            self.auth
                .cleanup_expired_tokens(&ctx)
                .await
                .map(AckResponse::with_count)
        })
        .await
    }
}

/// Await `fut`, turning a panic into an internal failure and any error into
/// a status prefixed with `operation`.
pub(crate) async fn guarded<T, F>(operation: &'static str, fut: F) -> Result<T, Status>
where
    F: Future<Output = Result<T, AuthError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result.map_err(|e| to_status(Some(operation), e)),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(operation, panic = %reason, "Recovered from panic in request");
            Err(to_status(
                Some(operation),
                AuthError::internal(operation, anyhow::anyhow!("panic: {reason}")),
            ))
        }
    }
}
