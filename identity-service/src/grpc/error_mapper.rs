//! Translation of `AuthError` into `tonic::Status`.
//!
//! | AuthError | Code | Message |
//! |-----------|------|---------|
//! | `InvalidInput` | `INVALID_ARGUMENT` | validation message |
//! | `NotFoundIdentity` | `NOT_FOUND` | user not found |
//! | `ConflictIdentityExists` | `ALREADY_EXISTS` | user already exists |
//! | `InvalidToken`, `ExpiredToken`, `RevokedToken` | `UNAUTHENTICATED` | invalid token |
//! | `NotFoundToken` | `NOT_FOUND` | token not found |
//! | `InvalidCredentials` | `UNAUTHENTICATED` | invalid credentials |
//! | `RateLimited` | `RESOURCE_EXHAUSTED` | too many requests |
//! | `Canceled` | `CANCELLED` | request canceled |
//! | `DeadlineExceeded` | `DEADLINE_EXCEEDED` | deadline exceeded |
//! | `Internal` | `INTERNAL` | internal server error |

use service_core::grpc::RETRY_AFTER_KEY;
use tonic::metadata::MetadataValue;
use tonic::Status;

use crate::services::AuthError;

const INVALID_TOKEN: &str = "invalid token";
const INTERNAL: &str = "internal server error";

/// Map `err` to a status, prefixing the message with `operation` when one
/// is given. Internal causes are logged here and never sent to the caller.
pub fn to_status(operation: Option<&str>, err: AuthError) -> Status {
    let msg = |text: &str| match operation {
        Some(op) => format!("{op}: {text}"),
        None => text.to_string(),
    };

    match err {
        AuthError::InvalidInput(e) => Status::invalid_argument(msg(&e.to_string())),
        AuthError::NotFoundIdentity => Status::not_found(msg("user not found")),
        AuthError::ConflictIdentityExists => Status::already_exists(msg("user already exists")),
        AuthError::InvalidToken | AuthError::ExpiredToken | AuthError::RevokedToken => {
            tracing::debug!(operation, kind = %err, "Token rejected");
            Status::unauthenticated(msg(INVALID_TOKEN))
        }
        AuthError::NotFoundToken => Status::not_found(msg("token not found")),
        AuthError::InvalidCredentials => Status::unauthenticated(msg("invalid credentials")),
        AuthError::RateLimited {
            operation: limited,
            retry_after,
        } => {
            let mut status = Status::resource_exhausted(msg("too many requests"));
            let seconds = retry_after.as_secs().max(1);
            if let Ok(value) = MetadataValue::try_from(seconds.to_string()) {
                status.metadata_mut().insert(RETRY_AFTER_KEY, value);
            }
            tracing::debug!(operation = limited, seconds, "Rejected by rate limiter");
            status
        }
        AuthError::Canceled => Status::cancelled(msg("request canceled")),
        AuthError::DeadlineExceeded => Status::deadline_exceeded(msg("deadline exceeded")),
        AuthError::Internal {
            operation: failed,
            cause,
        } => {
            tracing::error!(operation = failed, error = %cause, "Internal error");
            Status::internal(msg(INTERNAL))
        }
    }
}
