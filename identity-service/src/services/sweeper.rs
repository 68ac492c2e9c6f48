//! Background task that periodically deletes expired sessions.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::auth::AuthService;
use super::context::RequestContext;

/// Run the expiry sweep every `interval` until `cancel` fires. Each sweep
/// gets its own context derived from `cancel`, so shutdown interrupts an
/// in-flight delete.
pub async fn run(auth: AuthService, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Session sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                let ctx = RequestContext::child_of(&cancel, Some(interval));
                if let Err(e) = auth.cleanup_expired_tokens(&ctx).await {
                    tracing::error!(error = %e, "Session sweep failed");
                }
            }
        }
    }
}
