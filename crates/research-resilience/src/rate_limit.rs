//! Minimum-spacing rate limiter
//!
//! One limiter instance guards one external service. The last-acquisition
//! timestamp is held under an async mutex for the whole wait, so concurrent
//! callers funneled through the same limiter are serialized to the spacing.

use crate::error::{ResilienceError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Gate enforcing a minimum interval between calls
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `calls_per_second` calls per second
    pub fn new(calls_per_second: f64) -> Result<Self> {
        if !calls_per_second.is_finite() || calls_per_second <= 0.0 {
            return Err(ResilienceError::InvalidRateLimit(format!(
                "calls_per_second must be positive, got {calls_per_second}"
            )));
        }
        Ok(Self::with_interval(Duration::from_secs_f64(
            1.0 / calls_per_second,
        )))
    }

    /// Create a limiter from an explicit minimum interval
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the minimum interval has passed since the previous call
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!("Rate limiter waiting {:?}", wait);
                sleep(wait).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    /// Acquire a slot, then run the future
    pub async fn run<F, T>(&self, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        self.acquire().await;
        operation.await
    }
}
