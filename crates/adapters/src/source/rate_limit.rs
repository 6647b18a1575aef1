//! Minimal request-rate limiter.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces calls so that at most `rate` requests per second go out.
///
/// Shared per token: every clone of the source client holds the same limiter.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limit to `per_second` requests per second.
    #[must_use]
    pub fn per_second(per_second: u32) -> Self {
        let per_second = per_second.max(1);
        Self {
            min_interval: Duration::from_millis(1000 / u64::from(per_second)),
            last: Mutex::new(None),
        }
    }

    /// Wait until the next request may go out.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        let now = Instant::now();
        if let Some(previous) = *last {
            let earliest = previous + self.min_interval;
            if earliest > now {
                tokio::time::sleep(earliest - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}
