//! Inline retry around a single dispatch attempt

use contracts::{DeliveryError, DeliveryTransport, Grid, RetryPolicy};
use tokio::time::sleep;
use tracing::{instrument, warn};

use crate::rate_limiter::RateLimiter;

/// Deliver `grid`, retrying transient failures in place
///
/// Every call takes its own rate limiter slot. `Rejected` errors end the loop
/// immediately. Returns the number of device calls made on success.
#[instrument(
    name = "deliver_with_retry",
    skip(transport, limiter, policy, grid),
    fields(transport = %transport.name(), max_calls = policy.max_inline_attempts)
)]
pub async fn deliver_with_retry<T>(
    transport: &T,
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    grid: &Grid,
) -> Result<u32, DeliveryError>
where
    T: DeliveryTransport + ?Sized,
{
    let mut calls: u32 = 0;
    loop {
        let delay = policy.delay_for_attempt(calls);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        limiter.acquire().await;
        match transport.deliver(grid).await {
            Ok(()) => return Ok(calls + 1),
            Err(err) => {
                calls += 1;
                if !err.is_transient() || !policy.should_retry(calls) {
                    return Err(err);
                }
                warn!(call = calls, error = %err, "Delivery failed, retrying");
            }
        }
    }
}
