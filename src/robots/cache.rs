//! Robots.txt caching implementation
//!
//! Two tiers are used: an optional persistent cache shared between processes
//! (see [`PersistentCache`]) and an in-process copy of the parsed rules.

use crate::robots::RobotsTxt;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Key-value store with expiry, supplied by the host application
///
/// Implementations report misses and their own failures as `None` and
/// swallow write failures; robots.txt is refetched in that case.
#[async_trait]
pub trait PersistentCache: Send + Sync {
    /// Returns the stored bytes if present and not expired
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores bytes under `key` for `ttl`
    async fn set(&self, key: &str, value: &[u8], ttl: std::time::Duration);
}

/// Parsed robots.txt for one origin, held in memory
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub rules: RobotsTxt,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    ttl: Duration,
}

impl CachedRobots {
    /// Creates a new CachedRobots instance stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `rules` - The parsed robots.txt content
    /// * `ttl` - How long the entry stays fresh
    pub fn new(rules: RobotsTxt, ttl: std::time::Duration) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(24)),
        }
    }

    /// Checks if the entry is older than its TTL
    pub fn is_stale(&self) -> bool {
        self.age() >= self.ttl
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}
