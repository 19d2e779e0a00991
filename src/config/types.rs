use serde::Deserialize;
use std::collections::HashMap;

/// Main configuration structure for Pricetide
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(rename = "rate-limits", default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(rename = "html-providers", default)]
    pub html_providers: Vec<HtmlProviderEntry>,
}

/// Outbound fetch behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Global switch for requests to external hosts
    #[serde(rename = "allow-live-fetch", default)]
    pub allow_live_fetch: bool,

    /// User-Agent header sent with every request and matched against robots.txt
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "http-timeout-seconds", default = "default_http_timeout")]
    pub http_timeout_seconds: u64,

    /// Maximum number of retries after the first attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// How long a fetched robots.txt stays valid (hours)
    #[serde(rename = "robots-cache-ttl-hours", default = "default_robots_ttl")]
    pub robots_cache_ttl_hours: u64,

    /// Base of the exponential backoff (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound of the random jitter added to each delay (milliseconds)
    #[serde(rename = "backoff-jitter-ms", default = "default_backoff_jitter")]
    pub backoff_jitter_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            allow_live_fetch: false,
            user_agent: default_user_agent(),
            http_timeout_seconds: default_http_timeout(),
            max_retries: default_max_retries(),
            robots_cache_ttl_hours: default_robots_ttl(),
            backoff_base_ms: default_backoff_base(),
            backoff_jitter_ms: default_backoff_jitter(),
        }
    }
}

fn default_user_agent() -> String {
    "PriceTideBot/1.0 (+contact@example.com)".to_string()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_robots_ttl() -> u64 {
    24
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_jitter() -> u64 {
    1000
}

/// Token bucket settings for one provider key
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub rps: f64,
    /// Bucket capacity
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { rps: 1.0, burst: 2 }
    }
}

/// Rate limits keyed by provider name
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitsConfig {
    /// Used for any provider key without an explicit entry
    #[serde(default)]
    pub default: RateLimitConfig,
    #[serde(default)]
    pub providers: HashMap<String, RateLimitConfig>,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("demo".to_string(), RateLimitConfig { rps: 10.0, burst: 2 });
        Self {
            default: RateLimitConfig::default(),
            providers,
        }
    }
}

/// How the base shipping fee is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMode {
    /// Price-bracket table
    Table,
    /// One fee for every price
    Flat,
}

/// Landed-price normalization settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PricingConfig {
    #[serde(default = "default_shipping_mode")]
    pub mode: ShippingMode,
    /// Handling fee as a percentage of the item price
    #[serde(default = "default_fee_percent")]
    pub fee_percent: f64,
    /// Display-only conversion rate (target major units per source major unit)
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            mode: default_shipping_mode(),
            fee_percent: default_fee_percent(),
            exchange_rate: default_exchange_rate(),
        }
    }
}

fn default_shipping_mode() -> ShippingMode {
    ShippingMode::Table
}

fn default_fee_percent() -> f64 {
    3.0
}

fn default_exchange_rate() -> f64 {
    150.0
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Per-provider ingestion plans
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub providers: HashMap<String, QueryPlanEntry>,
}

/// Search queries driven for one provider
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueryPlanEntry {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub queries: Vec<String>,
    /// Cap on candidates processed per query (the built-in cap when absent)
    #[serde(default)]
    pub max_results_per_query: Option<usize>,
    /// Pause between consecutive queries (milliseconds)
    #[serde(default)]
    pub query_delay_ms: u64,
}

fn default_enabled() -> bool {
    true
}

/// A generic HTML listing source
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HtmlProviderEntry {
    /// Provider name, also used as the rate-limit key and offer source
    pub name: String,

    /// Site root, e.g. `https://shop.example.com`
    pub base_url: String,

    /// Search page path; `{query}` is replaced with the encoded query
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Product page path; `{slug}` is replaced with a slug of the title
    #[serde(default = "default_offer_path")]
    pub offer_path: String,

    /// Identifier kind assigned to `data-item-id` attributes, if any
    #[serde(default)]
    pub identifier_kind: Option<String>,
}

fn default_search_path() -> String {
    "/search?q={query}".to_string()
}

fn default_offer_path() -> String {
    "/product/{slug}".to_string()
}
