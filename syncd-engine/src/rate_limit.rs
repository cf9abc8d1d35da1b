//! Token-bucket admission limiter.
//!
//! The bucket starts full (`burst_limit` tokens). Whenever at least one full
//! window has elapsed since the last refill it gains `changes_per_second`
//! tokens per elapsed window, capped at `burst_limit`. An empty bucket
//! rejects; it never waits.

use std::time::Duration;

use syncd_core::RateLimits;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct TokenBucket {
    burst: u64,
    refill: u64,
    window: Duration,
    tokens: u64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(limits: &RateLimits, now: Instant) -> Self {
        let burst = u64::from(limits.burst_limit);
        Self {
            burst,
            refill: u64::from(limits.changes_per_second),
            window: limits.window(),
            tokens: burst,
            last_refill: now,
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    pub fn available(&self) -> u64 {
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if self.window.is_zero() || elapsed < self.window {
            return;
        }
        let windows = (elapsed.as_nanos() / self.window.as_nanos()) as u64;
        self.tokens = self
            .burst
            .min(self.tokens.saturating_add(windows.saturating_mul(self.refill)));
        self.last_refill = now;
    }
}
