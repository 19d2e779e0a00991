//! Per-provider rate limiting
//!
//! Each provider key owns one token bucket, created lazily on first use from
//! the configured limits (or the default limit for unknown keys). Buckets are
//! independent: waiting on one key never delays another.

mod bucket;

use crate::config::{RateLimitConfig, RateLimitsConfig};
use bucket::TokenBucket;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit wait for '{key}' was cancelled")]
    Cancelled { key: String },
}

/// Hands out per-key token buckets and blocks callers until a token is free
#[derive(Debug)]
pub struct RateLimiterManager {
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
    configs: HashMap<String, RateLimitConfig>,
    default: RateLimitConfig,
}

impl RateLimiterManager {
    /// Creates a manager with explicit per-key limits and a fallback limit
    pub fn new(configs: HashMap<String, RateLimitConfig>, default: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            configs,
            default,
        }
    }

    /// Creates a manager from the `[rate-limits]` configuration section
    pub fn from_config(config: &RateLimitsConfig) -> Self {
        Self::new(config.providers.clone(), config.default)
    }

    /// Returns the limit that applies to a key
    pub fn config_for(&self, key: &str) -> RateLimitConfig {
        self.configs.get(key).copied().unwrap_or(self.default)
    }

    /// Returns the bucket for a key, creating it on first use
    ///
    /// Concurrent first calls for the same key observe the same bucket.
    fn bucket(&self, key: &str) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }

        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                let config = self.config_for(key);
                tracing::debug!(
                    "Creating rate limiter for '{}' ({} rps, burst {})",
                    key,
                    config.rps,
                    config.burst
                );
                Arc::new(Mutex::new(TokenBucket::new(&config)))
            });
        Arc::clone(bucket.value())
    }

    fn lock(bucket: &Mutex<TokenBucket>) -> MutexGuard<'_, TokenBucket> {
        bucket.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Rate limiter bucket mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Blocks until a token for `key` is available
    ///
    /// # Arguments
    ///
    /// * `cancel` - Cancellation token; a cancelled wait consumes no token
    /// * `key` - Provider key
    ///
    /// # Returns
    ///
    /// * `Ok(())` - A token was consumed
    /// * `Err(RateLimitError::Cancelled)` - The wait was cancelled
    pub async fn wait(&self, cancel: &CancellationToken, key: &str) -> Result<(), RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled {
                key: key.to_string(),
            });
        }

        let bucket = self.bucket(key);
        let delay = Self::lock(&bucket).reserve();

        if delay == Duration::ZERO {
            return Ok(());
        }

        tracing::trace!("Rate limiter: waiting {:?} for '{}'", delay, key);

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => {
                Self::lock(&bucket).release();
                Err(RateLimitError::Cancelled { key: key.to_string() })
            }
        }
    }

    /// Number of keys that currently own a bucket
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn manager() -> RateLimiterManager {
        let mut configs = HashMap::new();
        configs.insert("fast".to_string(), RateLimitConfig { rps: 10.0, burst: 2 });
        configs.insert("slow".to_string(), RateLimitConfig { rps: 0.5, burst: 1 });
        RateLimiterManager::new(configs, RateLimitConfig { rps: 1.0, burst: 2 })
    }

    #[tokio::test]
    async fn test_burst_then_throttle() {
        let limiter = manager();
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter.wait(&cancel, "fast").await.unwrap();
        limiter.wait(&cancel, "fast").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));

        limiter.wait(&cancel, "fast").await.unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(50),
            "third call returned after {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let limiter = manager();
        let cancel = CancellationToken::new();

        limiter.wait(&cancel, "slow").await.unwrap();

        let start = Instant::now();
        limiter.wait(&cancel, "fast").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.bucket_count(), 2);
    }

    #[test]
    fn test_unknown_key_uses_default() {
        let limiter = manager();
        assert_eq!(
            limiter.config_for("unknown"),
            RateLimitConfig { rps: 1.0, burst: 2 }
        );
        assert_eq!(limiter.config_for("slow").burst, 1);
    }

    #[test]
    fn test_same_key_shares_bucket() {
        let limiter = manager();
        let a = limiter.bucket("fast");
        let b = limiter.bucket("fast");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_error() {
        let limiter = manager();
        let cancel = CancellationToken::new();

        limiter.wait(&cancel, "slow").await.unwrap();

        let waiter_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waiter_cancel.cancel();
        });

        let start = Instant::now();
        let result = limiter.wait(&cancel, "slow").await;
        assert!(matches!(result, Err(RateLimitError::Cancelled { ref key }) if key == "slow"));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_already_cancelled_fails_fast() {
        let limiter = manager();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(limiter.wait(&cancel, "fast").await.is_err());
        assert_eq!(limiter.bucket_count(), 0);
    }
}
