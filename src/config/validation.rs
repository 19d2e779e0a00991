use crate::config::types::{
    Config, FetchConfig, HtmlProviderEntry, IngestionConfig, PricingConfig, RateLimitConfig,
    RateLimitsConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Slowest accepted refill rate (one request every ~17 minutes)
const MIN_RPS: f64 = 0.001;

/// One year
const MAX_ROBOTS_TTL_HOURS: u64 = 24 * 365;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_rate_limits(&config.rate_limits)?;
    validate_pricing_config(&config.pricing)?;
    validate_storage_config(&config.storage)?;
    validate_ingestion_config(&config.ingestion)?;
    validate_html_providers(&config.html_providers)?;
    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.http_timeout_seconds < 1 || config.http_timeout_seconds > 300 {
        return Err(ConfigError::Validation(format!(
            "http_timeout_seconds must be between 1 and 300, got {}",
            config.http_timeout_seconds
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if !(1..=MAX_ROBOTS_TTL_HOURS).contains(&config.robots_cache_ttl_hours) {
        return Err(ConfigError::Validation(format!(
            "robots_cache_ttl_hours must be between 1 and {}, got {}",
            MAX_ROBOTS_TTL_HOURS, config.robots_cache_ttl_hours
        )));
    }

    Ok(())
}

/// Validates the default and per-provider token bucket settings
fn validate_rate_limits(config: &RateLimitsConfig) -> Result<(), ConfigError> {
    validate_rate_limit("default", &config.default)?;
    for (name, limit) in &config.providers {
        validate_rate_limit(name, limit)?;
    }
    Ok(())
}

fn validate_rate_limit(key: &str, limit: &RateLimitConfig) -> Result<(), ConfigError> {
    if !limit.rps.is_finite() || limit.rps < MIN_RPS {
        return Err(ConfigError::Validation(format!(
            "rate limit '{}': rps must be a number >= {}, got {}",
            key, MIN_RPS, limit.rps
        )));
    }

    if limit.burst < 1 {
        return Err(ConfigError::Validation(format!(
            "rate limit '{}': burst must be >= 1",
            key
        )));
    }

    Ok(())
}

/// Validates pricing configuration
fn validate_pricing_config(config: &PricingConfig) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&config.fee_percent) {
        return Err(ConfigError::Validation(format!(
            "fee_percent must be between 0 and 100, got {}",
            config.fee_percent
        )));
    }

    if !config.exchange_rate.is_finite() || config.exchange_rate <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "exchange_rate must be positive, got {}",
            config.exchange_rate
        )));
    }

    Ok(())
}

fn validate_storage_config(config: &crate::config::types::StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates per-provider query plans
fn validate_ingestion_config(config: &IngestionConfig) -> Result<(), ConfigError> {
    for (name, plan) in &config.providers {
        validate_provider_name(name)?;

        if plan.max_results_per_query == Some(0) {
            return Err(ConfigError::Validation(format!(
                "provider '{}': max_results_per_query must be >= 1",
                name
            )));
        }

        if plan.queries.len() > 50 {
            return Err(ConfigError::Validation(format!(
                "provider '{}': at most 50 queries are allowed, got {}",
                name,
                plan.queries.len()
            )));
        }
    }
    Ok(())
}

/// Validates HTML provider entries
fn validate_html_providers(entries: &[HtmlProviderEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in entries {
        validate_provider_name(&entry.name)?;

        if entry.name == "demo" || !seen.insert(entry.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate provider name '{}'",
                entry.name
            )));
        }

        let url = Url::parse(&entry.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid base_url '{}': {}", entry.base_url, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "base_url '{}' must use http or https",
                entry.base_url
            )));
        }

        if !entry.search_path.starts_with('/') || !entry.offer_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "provider '{}': search_path and offer_path must start with '/'",
                entry.name
            )));
        }
    }

    Ok(())
}

/// Provider names double as rate-limit keys and offer sources
fn validate_provider_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "provider name cannot be empty".to_string(),
        ));
    }

    if name.eq_ignore_ascii_case("all") {
        return Err(ConfigError::Validation(
            "'all' is reserved and cannot be used as a provider name".to_string(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "provider name must contain only alphanumeric characters, '-' and '_', got '{}'",
            name
        )));
    }

    Ok(())
}
