//! URL handling module for Pricetide
//!
//! This module parses fetch targets, extracts the pieces recorded in audit
//! entries, and classifies targets as internal or external. Only external
//! targets are subject to the live-fetch switch and robots.txt policy.

mod address;
mod domain;

pub use address::is_internal_host;
pub use domain::{extract_host, extract_path, origin_of, robots_url};

use crate::{UrlError, UrlResult};
use url::Url;

/// Classification of a fetch target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlClass {
    /// Loopback/private host, or a non-http scheme
    Internal,
    /// Public http(s) host
    External,
}

impl UrlClass {
    /// Returns true if this target is subject to compliance checks
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }
}

/// Parses a fetch target
///
/// # Arguments
///
/// * `target` - The raw URL string
///
/// # Returns
///
/// * `Ok(Url)` - The parsed URL
/// * `Err(UrlError)` - The string is not an absolute URL
pub fn parse_target(target: &str) -> UrlResult<Url> {
    Url::parse(target.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", target, e)))
}

/// Classifies a URL as internal or external
///
/// A URL is external only when it uses `http` or `https`, has a host, and
/// that host is not loopback, link-local or in a private range.
///
/// # Examples
///
/// ```
/// use pricetide::url::{classify_url, UrlClass};
/// use url::Url;
///
/// let url = Url::parse("https://shop.example.com/item").unwrap();
/// assert_eq!(classify_url(&url), UrlClass::External);
///
/// let url = Url::parse("http://127.0.0.1:8080/item").unwrap();
/// assert_eq!(classify_url(&url), UrlClass::Internal);
/// ```
pub fn classify_url(url: &Url) -> UrlClass {
    if !matches!(url.scheme(), "http" | "https") {
        return UrlClass::Internal;
    }

    match url.host() {
        Some(host) if !is_internal_host(&host) => UrlClass::External,
        _ => UrlClass::Internal,
    }
}
