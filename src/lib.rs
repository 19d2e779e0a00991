//! Pricetide: a compliant price ingestion core
//!
//! This crate fetches product and offer data from several providers while
//! respecting robots.txt, per-provider rate limits and a global live-fetch
//! switch, then merges candidates into canonical products and recomputes a
//! normalized landed price for every offer.

pub mod audit;
pub mod config;
pub mod fetch;
pub mod identity;
pub mod ingest;
pub mod output;
pub mod pricing;
pub mod providers;
pub mod ratelimit;
pub mod robots;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Pricetide operations
#[derive(Debug, Error)]
pub enum TideError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Robots.txt error: {0}")]
    Robots(#[from] robots::RobotsError),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] ratelimit::RateLimitError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("HTML parse error for {url}: {message}")]
    HtmlParse { url: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TideError {
    /// Returns true if this error is the result of a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Fetch(fetch::FetchError::Cancelled { .. })
                | Self::RateLimit(ratelimit::RateLimitError::Cancelled { .. })
                | Self::Robots(robots::RobotsError::Cancelled { .. })
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),
}

/// Result type alias for Pricetide operations
pub type Result<T> = std::result::Result<T, TideError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use fetch::{FetchClient, FetchError};
pub use ingest::{Coordinator, JobReport, ProviderSelector};
pub use providers::{Candidate, Provider, ProviderRegistry};
pub use crate::url::{classify_url, UrlClass};
