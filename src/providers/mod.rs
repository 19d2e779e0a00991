//! Provider contract and registry
//!
//! A provider turns a search query into candidate products and a resolved
//! product into offers. The registry is an explicit object built at startup;
//! there is no global provider table.

mod demo;
mod html;
mod price;

pub use demo::{DemoProvider, DEMO_PROVIDER_NAME};
pub use html::HtmlListingProvider;
pub use price::{extract_brand, parse_delivery_days, parse_price, slugify};

use crate::config::Config;
use crate::fetch::FetchClient;
use crate::storage::{NewOffer, ProductRecord};
use crate::TideError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// External identifier attached to a candidate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub kind: String,
    pub value: String,
}

impl Identifier {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    /// Returns true if both kind and value carry non-whitespace text
    pub fn is_usable(&self) -> bool {
        !self.kind.trim().is_empty() && !self.value.trim().is_empty()
    }
}

/// A product as reported by a provider search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub image_url: Option<String>,
    /// Name of the provider that produced this candidate
    pub source: String,
    pub identifier: Option<Identifier>,
    pub source_url: Option<String>,
}

impl Candidate {
    pub fn new(source: &str, title: &str) -> Self {
        Self {
            title: title.to_string(),
            source: source.to_string(),
            ..Self::default()
        }
    }

    /// The identifier, if it is usable for matching
    pub fn usable_identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref().filter(|id| id.is_usable())
    }
}

/// A source of products and offers
///
/// Implementations that touch the network must route every request through
/// [`crate::fetch::FetchClient`] so the live-fetch switch, robots.txt policy,
/// rate limits and auditing apply.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name, used for offer sources, rate-limit keys and selection
    fn name(&self) -> &str;

    /// Searches the provider for products matching `query`
    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &str,
    ) -> Result<Vec<Candidate>, TideError>;

    /// Fetches the current offers for a resolved product
    async fn fetch_offers(
        &self,
        cancel: &CancellationToken,
        product: &ProductRecord,
    ) -> Result<Vec<NewOffer>, TideError>;
}

struct RegisteredProvider {
    provider: Arc<dyn Provider>,
    enabled: bool,
}

/// Named collection of providers
///
/// Listing order is sorted by name so runs are deterministic.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own name, enabled
    ///
    /// A provider with the same name is replaced.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            tracing::warn!("Replacing already registered provider {}", name);
        }
        self.providers.insert(
            name,
            RegisteredProvider {
                provider,
                enabled: true,
            },
        );
    }

    /// Looks up an enabled provider by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .get(name)
            .filter(|entry| entry.enabled)
            .map(|entry| entry.provider.clone())
    }

    /// Returns true if a provider with this name is registered, enabled or not
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Names of enabled providers in sorted order
    pub fn names(&self) -> Vec<String> {
        self.providers
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Enables or disables a registered provider
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The flag was updated
    /// * `Err(TideError::ProviderNotFound)` - No provider has this name
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), TideError> {
        match self.providers.get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                Ok(())
            }
            None => Err(TideError::ProviderNotFound(name.to_string())),
        }
    }

    pub fn enable(&mut self, name: &str) -> Result<(), TideError> {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> Result<(), TideError> {
        self.set_enabled(name, false)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Builds the registry for a configuration
///
/// Registers the demo provider and every configured HTML provider, then
/// disables those whose ingestion entry sets `enabled = false`.
///
/// # Arguments
///
/// * `config` - Loaded configuration
/// * `fetch` - Fetch client shared by network providers
pub fn build_registry(
    config: &Config,
    fetch: Arc<FetchClient>,
) -> Result<ProviderRegistry, TideError> {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(DemoProvider::new()));

    for entry in &config.html_providers {
        let provider = HtmlListingProvider::new(entry, fetch.clone())?;
        registry.register(Arc::new(provider));
    }

    for (name, plan) in &config.ingestion.providers {
        if plan.enabled {
            continue;
        }
        match registry.disable(name) {
            Ok(()) => tracing::info!("Provider {} disabled by configuration", name),
            Err(_) => tracing::warn!("Ingestion settings for unknown provider {}", name),
        }
    }

    Ok(registry)
}
