use crate::config::RateLimitConfig;
use std::time::{Duration, Instant};

/// Longest single wait handed out by a bucket
pub(crate) const MAX_WAIT: Duration = Duration::from_secs(3600);

/// Refill rate used when the configured rate is not a positive number
const FALLBACK_RATE: f64 = 1.0 / 3600.0;

/// Token bucket state for a single key
///
/// Tokens may go negative: a caller reserves its token up front and then
/// waits out the debt, so concurrent waiters queue behind each other in
/// reservation order.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    tokens: f64,
    last_update: Instant,
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    /// Creates a full bucket
    pub(crate) fn new(config: &RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst.max(1));
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: if config.rps.is_finite() && config.rps > 0.0 {
                config.rps
            } else {
                FALLBACK_RATE
            },
            capacity,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    /// Takes one token and returns how long the caller must wait before using it
    pub(crate) fn reserve(&mut self) -> Duration {
        self.refill();
        self.tokens -= 1.0;

        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-self.tokens / self.rate)
                .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT))
        }
    }

    /// Returns a reserved token that was never used
    pub(crate) fn release(&mut self) {
        self.refill();
        self.tokens = (self.tokens + 1.0).min(self.capacity);
    }

    #[cfg(test)]
    pub(crate) fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }
}
