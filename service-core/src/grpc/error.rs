//! Conversion from `tonic::Status` into `AppError`.
//!
//! Services expose their operations as `Result<T, Status>`; HTTP adapters
//! convert the status with `?` and let `AppError` render the response.
//!
//! | gRPC Status | AppError |
//! |-------------|----------|
//! | `INVALID_ARGUMENT` | `BadRequest` |
//! | `NOT_FOUND` | `NotFound` |
//! | `UNAUTHENTICATED` | `Unauthorized` |
//! | `ALREADY_EXISTS` | `Conflict` |
//! | `RESOURCE_EXHAUSTED` | `TooManyRequests` |
//! | `CANCELLED` | `Canceled` |
//! | `DEADLINE_EXCEEDED` | `GatewayTimeout` |
//! | `UNAVAILABLE` | `ServiceUnavailable` |
//! | anything else | `InternalError` |

use tonic::{Code, Status};

use crate::error::AppError;

/// Metadata key carrying the number of seconds a client should wait.
pub const RETRY_AFTER_KEY: &str = "retry-after";

impl From<Status> for AppError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
                AppError::BadRequest(anyhow::anyhow!("{}", status.message()))
            }
            Code::NotFound => AppError::NotFound(anyhow::anyhow!("{}", status.message())),
            Code::Unauthenticated | Code::PermissionDenied => {
                AppError::Unauthorized(anyhow::anyhow!("{}", status.message()))
            }
            Code::AlreadyExists => AppError::Conflict(anyhow::anyhow!("{}", status.message())),
            Code::ResourceExhausted => {
                let retry_after = status
                    .metadata()
                    .get(RETRY_AFTER_KEY)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok());
                AppError::TooManyRequests(status.message().to_string(), retry_after)
            }
            Code::Cancelled => AppError::Canceled,
            Code::DeadlineExceeded => AppError::GatewayTimeout(status.message().to_string()),
            Code::Unavailable => AppError::ServiceUnavailable,
            Code::Internal | Code::Unknown | Code::DataLoss | Code::Aborted => {
                AppError::InternalError(anyhow::anyhow!("{}", status.message()))
            }
            Code::Unimplemented => {
                AppError::InternalError(anyhow::anyhow!("Not implemented: {}", status.message()))
            }
            Code::Ok => AppError::InternalError(anyhow::anyhow!("Unexpected OK status as error")),
        }
    }
}
