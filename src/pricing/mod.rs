//! Landed-price normalization
//!
//! Every stored offer carries a shipping fee, a handling fee and a total
//! recomputed from its item price, so offers from different sources compare
//! on the same basis. All amounts are integers in minor units (cents).

mod shipping;

pub use shipping::{base_shipping, handling_fee};

use crate::config::PricingConfig;
use crate::storage::NewOffer;
use chrono::{DateTime, Utc};

/// Computes shipping, fees and totals for offers
#[derive(Debug, Clone)]
pub struct PricingNormalizer {
    config: PricingConfig,
}

impl PricingNormalizer {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Shipping charged for an item: base fee plus the handling fee
    pub fn shipping(&self, price_cents: i64) -> i64 {
        base_shipping(self.config.mode, price_cents)
            + handling_fee(self.config.fee_percent, price_cents)
    }

    /// Landed total: `price + shipping(price)`
    pub fn total(&self, price_cents: i64) -> i64 {
        price_cents + self.shipping(price_cents)
    }

    /// Recomputes the derived amounts of an offer in place
    ///
    /// Provider-supplied shipping and totals are overwritten. `shipping_cents`
    /// holds the base fee and `fee_cents` the handling fee, so
    /// `total_cents == price_cents + shipping_cents + fee_cents`.
    ///
    /// # Arguments
    ///
    /// * `offer` - The offer to normalize
    /// * `now` - Timestamp recorded as `price_updated_at`
    pub fn normalize(&self, offer: &mut NewOffer, now: DateTime<Utc>) {
        offer.shipping_cents = base_shipping(self.config.mode, offer.price_cents);
        offer.fee_cents = handling_fee(self.config.fee_percent, offer.price_cents);
        offer.total_cents = offer.price_cents + offer.shipping_cents + offer.fee_cents;
        offer.price_updated_at = Some(now.to_rfc3339());
    }

    /// Converts an amount in cents to whole display units at the fixed rate
    ///
    /// Display only; never used for ordering or storage.
    pub fn convert_for_display(&self, amount_cents: i64) -> i64 {
        (amount_cents as f64 / 100.0 * self.config.exchange_rate).round() as i64
    }
}
