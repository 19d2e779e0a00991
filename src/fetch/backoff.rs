use crate::config::FetchConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Retry delays: `base * 2^attempt` plus random jitter
///
/// Yields exactly `max_retries` delays. Jitter is drawn from
/// `[0, min(jitter_max, base)]`, so each delay is at least as long as the
/// previous one.
///
/// # Example
///
/// ```
/// use pricetide::fetch::Backoff;
/// use std::time::Duration;
///
/// let delays: Vec<Duration> =
///     Backoff::new(Duration::from_millis(100), Duration::ZERO, 3).collect();
/// assert_eq!(
///     delays,
///     vec![
///         Duration::from_millis(100),
///         Duration::from_millis(200),
///         Duration::from_millis(400),
///     ]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    jitter_max: Duration,
    attempt: u32,
    max_retries: u32,
    rng: StdRng,
}

impl Backoff {
    pub fn new(base: Duration, jitter_max: Duration, max_retries: u32) -> Self {
        Self::with_rng(base, jitter_max, max_retries, StdRng::from_entropy())
    }

    /// Deterministic jitter, for tests
    pub fn with_seed(base: Duration, jitter_max: Duration, max_retries: u32, seed: u64) -> Self {
        Self::with_rng(base, jitter_max, max_retries, StdRng::seed_from_u64(seed))
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_jitter_ms),
            config.max_retries,
        )
    }

    fn with_rng(base: Duration, jitter_max: Duration, max_retries: u32, rng: StdRng) -> Self {
        Self {
            base,
            jitter_max,
            attempt: 0,
            max_retries,
            rng,
        }
    }

    fn jitter(&mut self) -> Duration {
        let cap = self.jitter_max.min(self.base).as_millis() as u64;
        if cap == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(0..=cap))
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }

        let factor = 2u32.saturating_pow(self.attempt);
        let delay = self.base.saturating_mul(factor).saturating_add(self.jitter());
        self.attempt += 1;
        Some(delay)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.max_retries.saturating_sub(self.attempt) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Backoff {}
