//! In-memory demo provider
//!
//! Serves a small fixed catalog so the pipeline can run without network
//! access. Every product gets the same three seller offers.

use crate::providers::{Candidate, Provider};
use crate::storage::{Availability, NewOffer, ProductRecord};
use crate::TideError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Provider name used for offer sources and rate-limit keys
pub const DEMO_PROVIDER_NAME: &str = "demo";

struct DemoProduct {
    title: &'static str,
    brand: &'static str,
    model: Option<&'static str>,
    image: &'static str,
}

const CATALOG: &[DemoProduct] = &[
    DemoProduct {
        title: "Wireless Bluetooth Headphones",
        brand: "AudioTech",
        model: Some("ATH-500BT"),
        image: "https://example.com/images/headphones.jpg",
    },
    DemoProduct {
        title: "Smart Watch Pro",
        brand: "TechTime",
        model: Some("TT-SW-2024"),
        image: "https://example.com/images/watch.jpg",
    },
    DemoProduct {
        title: "USB-C Charging Cable",
        brand: "ChargeMax",
        model: None,
        image: "https://example.com/images/cable.jpg",
    },
];

struct DemoOffer {
    seller: &'static str,
    price_cents: i64,
    shipping_cents: i64,
    days: (u32, u32),
    in_stock: bool,
    url: &'static str,
}

const OFFERS: &[DemoOffer] = &[
    DemoOffer {
        seller: "DemoSeller A",
        price_cents: 4999,
        shipping_cents: 999,
        days: (3, 5),
        in_stock: true,
        url: "https://example.com/seller-a/product",
    },
    DemoOffer {
        seller: "DemoSeller B",
        price_cents: 5499,
        shipping_cents: 1499,
        days: (5, 7),
        in_stock: true,
        url: "https://example.com/seller-b/product",
    },
    DemoOffer {
        seller: "DemoSeller C",
        price_cents: 4799,
        shipping_cents: 1999,
        days: (7, 10),
        in_stock: false,
        url: "https://example.com/seller-c/product",
    },
];

/// Static catalog provider
#[derive(Debug, Clone, Default)]
pub struct DemoProvider;

impl DemoProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for DemoProvider {
    fn name(&self) -> &str {
        DEMO_PROVIDER_NAME
    }

    /// Returns catalog products whose title contains `query`, ignoring case
    ///
    /// An empty query matches the whole catalog.
    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &str,
    ) -> Result<Vec<Candidate>, TideError> {
        if cancel.is_cancelled() {
            return Err(TideError::Cancelled);
        }

        let needle = query.trim().to_lowercase();
        let results = CATALOG
            .iter()
            .filter(|product| product.title.to_lowercase().contains(&needle))
            .map(|product| Candidate {
                title: product.title.to_string(),
                brand: Some(product.brand.to_string()),
                model: product.model.map(str::to_string),
                image_url: Some(product.image.to_string()),
                source: DEMO_PROVIDER_NAME.to_string(),
                identifier: None,
                source_url: None,
            })
            .collect();

        Ok(results)
    }

    async fn fetch_offers(
        &self,
        cancel: &CancellationToken,
        _product: &ProductRecord,
    ) -> Result<Vec<NewOffer>, TideError> {
        if cancel.is_cancelled() {
            return Err(TideError::Cancelled);
        }

        let offers = OFFERS
            .iter()
            .map(|demo| {
                let mut offer =
                    NewOffer::new(DEMO_PROVIDER_NAME, demo.seller, demo.price_cents, "USD");
                offer.shipping_cents = demo.shipping_cents;
                offer.total_cents = demo.price_cents + demo.shipping_cents;
                offer.availability = Availability::from_in_stock(demo.in_stock);
                offer.url = Some(demo.url.to_string());
                offer.est_delivery_days_min = Some(demo.days.0);
                offer.est_delivery_days_max = Some(demo.days.1);
                offer
            })
            .collect();

        Ok(offers)
    }
}
