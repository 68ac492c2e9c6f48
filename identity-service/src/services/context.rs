//! Per-request and per-service context objects.

use service_core::middleware::rate_limit::{check_operation, OperationRateLimiter};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::AuthError;

/// Cancellation and deadline carried by one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context with no deadline that is never canceled unless asked to.
    pub fn background() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derive a context that is canceled when `parent` is.
    pub fn child_of(parent: &CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            cancel: parent.child_token(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fail fast when the request is already canceled or past its deadline.
    pub fn check(&self) -> Result<(), AuthError> {
        if self.cancel.is_cancelled() {
            return Err(AuthError::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(AuthError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Race `fut` against cancellation and the deadline. The losing future
    /// is dropped.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = T>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AuthError::Canceled),
            _ = deadline => Err(AuthError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

/// Long-lived state shared by every call into the orchestrator.
#[derive(Clone)]
pub struct ServiceContext {
    service_name: String,
    rate_limiter: Option<OperationRateLimiter>,
}

impl ServiceContext {
    pub fn new(service_name: impl Into<String>, rate_limiter: Option<OperationRateLimiter>) -> Self {
        Self {
            service_name: service_name.into(),
            rate_limiter,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Span for one operation.
    pub fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!("auth", service = %self.service_name, operation)
    }

    /// Admit one call of `operation` through the rate limiter.
    pub fn admit(&self, operation: &'static str) -> Result<(), AuthError> {
        let Some(limiter) = &self.rate_limiter else {
            return Ok(());
        };
        check_operation(limiter, operation).map_err(|retry_after| {
            tracing::warn!(
                operation,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            AuthError::RateLimited {
                operation,
                retry_after,
            }
        })
    }
}
