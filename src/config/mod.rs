//! Configuration module for Pricetide
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use pricetide::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("pricetide.toml")).unwrap();
//! println!("Live fetch enabled: {}", config.fetch.allow_live_fetch);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, FetchConfig, HtmlProviderEntry, IngestionConfig, PricingConfig, QueryPlanEntry,
    RateLimitConfig, RateLimitsConfig, ShippingMode, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
