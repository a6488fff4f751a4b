//! RateLimiter - minimum spacing between device calls
//!
//! `tokio::sync::Mutex` queues waiters in FIFO order, so the lock itself is
//! the admission queue. The holder sleeps out the remaining interval, stamps
//! the slot and releases admission to the next waiter.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Process-wide rate limiter for one physical device
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given minimum spacing
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    /// Configured spacing
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the next slot and claim it
    ///
    /// Returns the instant the slot was granted; consecutive grants are at
    /// least `min_interval` apart.
    pub async fn acquire(&self) -> Instant {
        let mut last = self.last_dispatch.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                debug!(
                    wait_ms = ready_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "Waiting for rate limiter slot"
                );
                sleep_until(ready_at).await;
            }
        }

        let granted = Instant::now();
        *last = Some(granted);
        granted
    }

    /// Last granted slot, if any
    pub async fn last_dispatch(&self) -> Option<Instant> {
        *self.last_dispatch.lock().await
    }
}
