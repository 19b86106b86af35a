//! Per-provider token bucket
//!
//! One limiter per provider, shared behind `Arc<Mutex<_>>` by every clone
//! of the client so that concurrent jobs draw from the same budget.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum requests per minute, 0 disables limiting
    rpm_limit: u32,
    /// Bucket capacity
    burst: u32,
    /// Tokens currently available
    tokens: f64,
    /// Last time tokens were added
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter with a full bucket
    pub fn new(rpm_limit: u32, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            rpm_limit,
            burst,
            tokens: burst as f64,
            last_refill: Instant::now(),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0, 1)
    }

    pub fn rpm_limit(&self) -> u32 {
        self.rpm_limit
    }

    fn tokens_per_ms(&self) -> f64 {
        self.rpm_limit as f64 / 60_000.0
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_refill).as_secs_f64() * 1000.0;
        self.tokens = (self.tokens + elapsed_ms * self.tokens_per_ms()).min(self.burst as f64);
        self.last_refill = now;
    }

    /// Check if a request can be made now, returns wait time in ms if not
    pub fn check_rate_limit(&mut self) -> Option<u64> {
        if self.rpm_limit == 0 {
            return None;
        }
        self.refill();
        if self.tokens >= 1.0 {
            return None;
        }
        let missing = 1.0 - self.tokens;
        Some((missing / self.tokens_per_ms()).ceil() as u64)
    }

    /// Record that a request was made
    pub fn record_request(&mut self) {
        if self.rpm_limit > 0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
        }
    }

    /// Wait until a request can be made, then take a token
    pub async fn wait_if_needed(&mut self) {
        while let Some(wait_ms) = self.check_rate_limit() {
            tracing::debug!("Rate limiter waiting {} ms", wait_ms);
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
        self.record_request();
    }
}
