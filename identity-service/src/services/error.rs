use std::time::Duration;
use thiserror::Error;

use super::store::StoreError;
use super::token::TokenError;
use crate::models::SessionRejection;
use crate::utils::ValidationError;

/// Every failure an auth operation can report.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(#[from] ValidationError),

    #[error("user not found")]
    NotFoundIdentity,

    #[error("user already exists")]
    ConflictIdentityExists,

    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    ExpiredToken,

    #[error("token has been revoked")]
    RevokedToken,

    #[error("token not found")]
    NotFoundToken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("too many requests")]
    RateLimited {
        operation: &'static str,
        retry_after: Duration,
    },

    #[error("request canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error in {operation}: {cause}")]
    Internal {
        operation: &'static str,
        cause: anyhow::Error,
    },
}

impl AuthError {
    pub fn internal(operation: &'static str, cause: impl Into<anyhow::Error>) -> Self {
        AuthError::Internal {
            operation,
            cause: cause.into(),
        }
    }

    /// Classify a storage failure raised while running `operation`.
    pub fn from_store(operation: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { constraint } => {
                tracing::debug!(operation, constraint = %constraint, "Uniqueness violation");
                AuthError::ConflictIdentityExists
            }
            StoreError::NotFound => AuthError::NotFoundToken,
            StoreError::Backend(cause) => AuthError::Internal { operation, cause },
        }
    }

    /// True for the token kinds that are reported to callers as one
    /// indistinguishable "invalid token".
    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidToken | AuthError::ExpiredToken | AuthError::RevokedToken
        )
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => AuthError::InvalidToken,
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::Mint(reason) => AuthError::internal("mint_token", anyhow::anyhow!(reason)),
        }
    }
}

impl From<SessionRejection> for AuthError {
    fn from(rejection: SessionRejection) -> Self {
        match rejection {
            SessionRejection::Invalid => AuthError::InvalidToken,
            SessionRejection::Revoked => AuthError::RevokedToken,
            SessionRejection::Expired => AuthError::ExpiredToken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_is_conflict() {
        let err = AuthError::from_store(
            "register",
            StoreError::UniqueViolation {
                constraint: "identities_email_key".to_string(),
            },
        );
        assert!(matches!(err, AuthError::ConflictIdentityExists));
    }

    #[test]
    fn test_backend_failure_keeps_operation() {
        let err = AuthError::from_store("login", StoreError::Backend(anyhow::anyhow!("pool closed")));
        match err {
            AuthError::Internal { operation, cause } => {
                assert_eq!(operation, "login");
                assert_eq!(cause.to_string(), "pool closed");
            }
            other => panic!("expected internal, got {other:?}"),
        }
    }

    #[test]
    fn test_token_and_session_conversions() {
        assert!(matches!(AuthError::from(TokenError::Invalid), AuthError::InvalidToken));
        assert!(matches!(AuthError::from(TokenError::Expired), AuthError::ExpiredToken));
        assert!(matches!(
            AuthError::from(TokenError::Mint("rng".into())),
            AuthError::Internal { .. }
        ));
        assert!(matches!(
            AuthError::from(SessionRejection::Revoked),
            AuthError::RevokedToken
        ));
        assert!(matches!(
            AuthError::from(SessionRejection::Expired),
            AuthError::ExpiredToken
        ));
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = AuthError::from(ValidationError::EmailRequired);
        assert_eq!(err.to_string(), "email is required");
    }
}
