//! Token bucket limiting requests to the endpoint across a run.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Token bucket for `requests_per_minute`, tracked as the time the bucket
/// would next be empty rather than as a token count.
///
/// The bucket starts full, so a burst up to the capacity goes through
/// immediately; after that requests are spaced `60s / rpm` apart.
pub struct TokenBucket {
    /// Time one token takes to refill.
    interval: Duration,
    /// How far ahead of now `drained_until` may run: `capacity - 1` tokens.
    burst: Duration,
    drained_until: Instant,
}

impl TokenBucket {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1);
        let interval = Duration::from_secs(60) / capacity;
        Self {
            interval,
            burst: interval * (capacity - 1),
            drained_until: Instant::now(),
        }
    }

    /// Take a token, or return how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        let drained_until = self.drained_until.max(now);
        let ahead = drained_until - now;
        if ahead > self.burst {
            return Err(ahead - self.burst);
        }
        self.drained_until = drained_until + self.interval;
        Ok(())
    }
}

/// Shared limiter that waits for a token instead of failing.
pub struct RequestLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RequestLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(requests_per_minute)),
        }
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_acquire() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            debug!(wait_ms = wait.as_millis() as u64, "Request rate limited");
            tokio::time::sleep(wait).await;
        }
    }
}
