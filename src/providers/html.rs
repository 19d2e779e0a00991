//! Generic HTML listing provider
//!
//! Scrapes a search results page and a product page from a configured site
//! using common e-commerce CSS classes. All requests go through the shared
//! [`FetchClient`], keyed by the provider name.

use crate::config::HtmlProviderEntry;
use crate::fetch::FetchClient;
use crate::providers::price::{
    extract_brand, parse_delivery_days, parse_price, slugify, truncate_chars,
};
use crate::providers::{Candidate, Identifier, Provider};
use crate::storage::{Availability, NewOffer, ProductRecord};
use crate::TideError;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Longest title kept from a listing
const MAX_TITLE_CHARS: usize = 200;

const UNKNOWN_SELLER: &str = "Unknown Seller";

/// Compiled CSS selectors used while scraping
struct Selectors {
    product: Selector,
    title: Selector,
    link: Selector,
    image: Selector,
    offer: Selector,
    seller: Selector,
    price: Selector,
    alt_price: Selector,
    stock: Selector,
    delivery: Selector,
    page_price: Selector,
    page_seller: Selector,
}

impl Selectors {
    fn compile() -> Result<Self, TideError> {
        Ok(Self {
            product: selector(".product, .item, [data-product], .product-item, .product-card")?,
            title: selector(".title, .name, h2, h3, h4, [data-title], .product-title")?,
            link: selector("a[href]")?,
            image: selector("img")?,
            offer: selector(
                ".offer, .listing, .seller-item, [data-offer], .price-row, .vendor-row",
            )?,
            seller: selector(".seller, .vendor, [data-seller], .store-name")?,
            price: selector(".price, [data-price], .amount, .cost")?,
            alt_price: selector(".price-value, .product-price, [itemprop='price']")?,
            stock: selector(".stock, .availability, [data-stock]")?,
            delivery: selector(".delivery, .shipping-time, [data-delivery]")?,
            page_price: selector(".price, [data-price], .product-price, [itemprop='price']")?,
            page_seller: selector(".seller, .vendor, .store, [data-seller]")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector, TideError> {
    Selector::parse(css).map_err(|e| TideError::HtmlParse {
        url: String::new(),
        message: format!("invalid selector {}: {:?}", css, e),
    })
}

/// Collapsed text content of the first element matching `selector`
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves an attribute value against the page URL
fn absolute(page_url: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    page_url.join(href).ok().map(|url| url.to_string())
}

/// Provider for a site exposing search and product pages as plain HTML
pub struct HtmlListingProvider {
    name: String,
    base_url: Url,
    search_path: String,
    offer_path: String,
    identifier_kind: Option<String>,
    fetch: Arc<FetchClient>,
    selectors: Selectors,
}

impl HtmlListingProvider {
    /// Creates a provider from its configuration entry
    ///
    /// # Arguments
    ///
    /// * `entry` - Name, base URL and page paths of the site
    /// * `fetch` - Shared fetch client
    ///
    /// # Returns
    ///
    /// * `Ok(HtmlListingProvider)` - Ready to use
    /// * `Err(TideError)` - The base URL does not parse
    pub fn new(entry: &HtmlProviderEntry, fetch: Arc<FetchClient>) -> Result<Self, TideError> {
        let base_url = Url::parse(&entry.base_url)?;

        Ok(Self {
            name: entry.name.clone(),
            base_url,
            search_path: entry.search_path.clone(),
            offer_path: entry.offer_path.clone(),
            identifier_kind: entry.identifier_kind.clone(),
            fetch,
            selectors: Selectors::compile()?,
        })
    }

    /// URL of the search page for `query`
    pub fn search_url(&self, query: &str) -> Result<Url, TideError> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let path = self.search_path.replace("{query}", &encoded);
        Ok(self.base_url.join(&path)?)
    }

    /// URL of the product page for a product title
    pub fn product_url(&self, title: &str) -> Result<Url, TideError> {
        let path = self.offer_path.replace("{slug}", &slugify(title));
        Ok(self.base_url.join(&path)?)
    }

    /// Extracts candidates from a search results page
    fn parse_candidates(&self, html: &str, page_url: &Url) -> Vec<Candidate> {
        let document = Html::parse_document(html);
        let s = &self.selectors;
        let mut candidates = Vec::new();

        for item in document.select(&s.product) {
            let link = item.select(&s.link).next();

            let title = first_text(item, &s.title)
                .or_else(|| link.map(element_text).filter(|t| !t.is_empty()));
            let Some(title) = title else {
                continue;
            };
            let title = truncate_chars(&title, MAX_TITLE_CHARS);

            let image_url = item.select(&s.image).next().and_then(|img| {
                let value = img.value();
                value
                    .attr("src")
                    .filter(|src| !src.trim().is_empty())
                    .or_else(|| value.attr("data-src"))
                    .and_then(|src| absolute(page_url, src))
            });

            let identifier = self.identifier_kind.as_ref().and_then(|kind| {
                item.value()
                    .attr("data-item-id")
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(|id| Identifier::new(kind.as_str(), id))
            });

            let source_url = link
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| absolute(page_url, href));

            candidates.push(Candidate {
                brand: extract_brand(&title),
                model: None,
                image_url,
                source: self.name.clone(),
                identifier,
                source_url,
                title,
            });
        }

        candidates
    }

    /// Extracts offers from a product page
    ///
    /// Falls back to a single page-level price when no offer rows exist.
    /// Rows without a positive price are skipped.
    fn parse_offers(&self, html: &str, page_url: &Url) -> Vec<NewOffer> {
        let document = Html::parse_document(html);
        let s = &self.selectors;
        let mut offers = Vec::new();

        for row in document.select(&s.offer) {
            let price = first_text(row, &s.price)
                .map(|text| parse_price(&text))
                .filter(|price| *price > 0)
                .or_else(|| {
                    first_text(row, &s.alt_price)
                        .map(|text| parse_price(&text))
                        .filter(|price| *price > 0)
                });
            let Some(price) = price else {
                continue;
            };

            let seller = first_text(row, &s.seller).unwrap_or_else(|| UNKNOWN_SELLER.to_string());
            let mut offer = NewOffer::new(&self.name, &seller, price, "USD");

            let stock = first_text(row, &s.stock)
                .unwrap_or_default()
                .to_lowercase();
            let out_of_stock = ["out of stock", "unavailable", "sold out"]
                .iter()
                .any(|marker| stock.contains(marker));
            offer.availability = Availability::from_in_stock(!out_of_stock);

            offer.url = row
                .select(&s.link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| absolute(page_url, href));

            if let Some((min, max)) = first_text(row, &s.delivery)
                .as_deref()
                .and_then(parse_delivery_days)
            {
                offer.est_delivery_days_min = Some(min);
                offer.est_delivery_days_max = Some(max);
            }

            offers.push(offer);
        }

        if offers.is_empty() {
            let root = document.root_element();
            let price = first_text(root, &s.page_price)
                .map(|text| parse_price(&text))
                .unwrap_or(0);

            if price > 0 {
                let seller = first_text(root, &s.page_seller)
                    .or_else(|| page_url.host_str().map(str::to_string))
                    .unwrap_or_else(|| UNKNOWN_SELLER.to_string());
                let mut offer = NewOffer::new(&self.name, &seller, price, "USD");
                offer.availability = Availability::InStock;
                offer.url = Some(page_url.to_string());
                offers.push(offer);
            }
        }

        offers
    }
}

#[async_trait]
impl Provider for HtmlListingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &str,
    ) -> Result<Vec<Candidate>, TideError> {
        let url = self.search_url(query)?;
        let body = self.fetch.get_text(cancel, &self.name, url.as_str()).await?;

        let candidates = self.parse_candidates(&body, &url);
        tracing::debug!(
            "{} search for {:?} found {} candidates",
            self.name,
            query,
            candidates.len()
        );
        Ok(candidates)
    }

    async fn fetch_offers(
        &self,
        cancel: &CancellationToken,
        product: &ProductRecord,
    ) -> Result<Vec<NewOffer>, TideError> {
        let url = self.product_url(&product.title)?;
        let body = self.fetch.get_text(cancel, &self.name, url.as_str()).await?;

        let offers = self.parse_offers(&body, &url);
        tracing::debug!(
            "{} returned {} offers for product {}",
            self.name,
            offers.len(),
            product.id
        );
        Ok(offers)
    }
}
