//! Robots.txt compliance gate
//!
//! This module fetches, parses and caches robots.txt files and answers
//! whether a URL may be fetched. Any failure to obtain robots.txt is
//! reported as an error; callers treat it as a denial.

mod cache;
mod parser;

pub use cache::{CachedRobots, PersistentCache};
pub use parser::{path_matches, RobotsDecision, RobotsGroup, RobotsTxt};

use crate::config::FetchConfig;
use crate::url::{extract_path, origin_of, robots_url};
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Robots.txt errors
#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to parse {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Invalid URL for robots.txt check: {0}")]
    InvalidUrl(String),

    #[error("robots.txt check for {url} was cancelled")]
    Cancelled { url: String },
}

type Slot = Arc<Mutex<Option<CachedRobots>>>;

/// Checks URLs against robots.txt with a two-tier cache
///
/// One slot exists per origin. Callers for the same origin queue on the
/// slot while it is being filled; other origins are unaffected.
pub struct RobotsChecker {
    client: Client,
    persistent: Option<Arc<dyn PersistentCache>>,
    ttl: Duration,
    slots: DashMap<String, Slot>,
}

impl RobotsChecker {
    /// Creates a checker without a persistent cache
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used to download robots.txt
    /// * `ttl` - Freshness of cached entries in both tiers
    pub fn new(client: Client, ttl: Duration) -> Self {
        Self {
            client,
            persistent: None,
            ttl,
            slots: DashMap::new(),
        }
    }

    /// Builds a checker whose client uses the configured user agent and timeout
    pub fn from_config(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .gzip(true)
            .brotli(true)
            .build()?;
        let ttl = Duration::from_secs(config.robots_cache_ttl_hours.saturating_mul(3600));
        Ok(Self::new(client, ttl))
    }

    /// Attaches a persistent cache tier, consulted before the memory tier
    pub fn with_persistent_cache(mut self, cache: Arc<dyn PersistentCache>) -> Self {
        self.persistent = Some(cache);
        self
    }

    /// Checks if a URL can be fetched according to its origin's robots.txt
    ///
    /// # Arguments
    ///
    /// * `cancel` - Cancellation token for the robots.txt download
    /// * `url` - The URL to check
    /// * `user_agent` - The user agent string to match against groups
    ///
    /// # Returns
    ///
    /// * `Ok(RobotsDecision)` - robots.txt was available and evaluated
    /// * `Err(RobotsError)` - robots.txt could not be obtained; deny access
    pub async fn can_fetch(
        &self,
        cancel: &CancellationToken,
        url: &Url,
        user_agent: &str,
    ) -> Result<RobotsDecision, RobotsError> {
        if url.host_str().is_none() {
            return Err(RobotsError::InvalidUrl(url.to_string()));
        }

        let rules = match self.rules_for(cancel, url).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!(
                    "Failed to obtain robots.txt for {}, blocking access: {}",
                    url,
                    e
                );
                return Err(e);
            }
        };

        Ok(rules.check(&extract_path(url), user_agent))
    }

    /// Returns the rules for the URL's origin, from cache or network
    async fn rules_for(
        &self,
        cancel: &CancellationToken,
        url: &Url,
    ) -> Result<RobotsTxt, RobotsError> {
        let key = format!("robots:{}", origin_of(url));
        let target = robots_url(url);

        if let Some(persistent) = &self.persistent {
            if let Some(bytes) = persistent.get(&key).await {
                if !bytes.is_empty() {
                    tracing::trace!("Using persisted robots.txt for {}", key);
                    return decode(&target, bytes);
                }
            }
        }

        let slot = self.slot(&key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if !cached.is_stale() {
                tracing::trace!("Using cached robots.txt for {}", key);
                return Ok(cached.rules.clone());
            }
        }

        tracing::debug!("Fetching robots.txt: {}", target);
        let bytes = self.download(cancel, &target).await?;
        let rules = decode(&target, bytes.clone())?;

        if let Some(persistent) = &self.persistent {
            persistent.set(&key, &bytes, self.ttl).await;
        }
        *entry = Some(CachedRobots::new(rules.clone(), self.ttl));

        Ok(rules)
    }

    fn slot(&self, key: &str) -> Slot {
        if let Some(slot) = self.slots.get(key) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .value(),
        )
    }

    /// Downloads robots.txt, trying `https` first for `http` origins
    async fn download(
        &self,
        cancel: &CancellationToken,
        target: &str,
    ) -> Result<Vec<u8>, RobotsError> {
        let mut candidates = Vec::with_capacity(2);
        if let Some(rest) = target.strip_prefix("http://") {
            candidates.push(format!("https://{}", rest));
        }
        candidates.push(target.to_string());

        let mut last_error = None;
        for candidate in candidates {
            match self.get_body(cancel, &candidate).await {
                Ok(bytes) => return Ok(bytes),
                Err(e @ RobotsError::Cancelled { .. }) => return Err(e),
                Err(e) => {
                    tracing::debug!("robots.txt attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RobotsError::Fetch {
            url: target.to_string(),
            message: "no robots.txt location to try".to_string(),
        }))
    }

    async fn get_body(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<u8>, RobotsError> {
        let fetch = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| RobotsError::Fetch {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

            if response.status() != StatusCode::OK {
                return Err(RobotsError::Status {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                });
            }

            let bytes = response.bytes().await.map_err(|e| RobotsError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            Ok::<_, RobotsError>(bytes.to_vec())
        };

        tokio::select! {
            result = fetch => result,
            _ = cancel.cancelled() => Err(RobotsError::Cancelled { url: url.to_string() }),
        }
    }
}

fn decode(url: &str, bytes: Vec<u8>) -> Result<RobotsTxt, RobotsError> {
    let content = String::from_utf8(bytes).map_err(|e| RobotsError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    Ok(RobotsTxt::parse(&content))
}
