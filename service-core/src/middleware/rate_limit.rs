use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Rate limiter keyed by operation name.
pub type OperationRateLimiter =
    Arc<RateLimiter<&'static str, DashMapStateStore<&'static str>, DefaultClock>>;

/// Build the quota allowing `attempts` calls per `window_seconds`, with the
/// whole allowance available as a burst.
pub fn quota(attempts: u32, window_seconds: u64) -> Quota {
    let attempts = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_millis((window_seconds.max(1) * 1000) / attempts.get() as u64);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(attempts))
        .allow_burst(attempts)
}

/// Create a limiter where every operation gets its own bucket.
pub fn create_operation_rate_limiter(attempts: u32, window_seconds: u64) -> OperationRateLimiter {
    Arc::new(RateLimiter::dashmap(quota(attempts, window_seconds)))
}

/// Check one call against the operation's bucket. On rejection returns how
/// long the caller should wait.
pub fn check_operation(limiter: &OperationRateLimiter, operation: &'static str) -> Result<(), Duration> {
    limiter
        .check_key(&operation)
        .map_err(|negative| negative.wait_time_from(DefaultClock::default().now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_per_operation() {
        let limiter = create_operation_rate_limiter(2, 60);

        assert!(check_operation(&limiter, "login").is_ok());
        assert!(check_operation(&limiter, "login").is_ok());
        let wait = check_operation(&limiter, "login").unwrap_err();
        assert!(wait > Duration::ZERO);

        // Separate bucket.
        assert!(check_operation(&limiter, "register").is_ok());
    }

    #[test]
    fn test_zero_attempts_still_admits_one() {
        let limiter = create_operation_rate_limiter(0, 60);
        assert!(check_operation(&limiter, "refresh").is_ok());
        assert!(check_operation(&limiter, "refresh").is_err());
    }
}
