use crate::config::ShippingMode;

/// Items priced below this ship at the lowest bracket
const LOW_BRACKET_LIMIT: i64 = 20_00;

/// Items priced below this (and not in the low bracket) ship at the middle bracket
const MID_BRACKET_LIMIT: i64 = 50_00;

const LOW_BRACKET_FEE: i64 = 9_99;
const MID_BRACKET_FEE: i64 = 14_99;
const HIGH_BRACKET_FEE: i64 = 19_99;

/// Fee used in flat mode
const FLAT_FEE: i64 = 14_99;

/// Base shipping fee in cents for an item price in cents
pub fn base_shipping(mode: ShippingMode, price_cents: i64) -> i64 {
    match mode {
        ShippingMode::Flat => FLAT_FEE,
        ShippingMode::Table if price_cents < LOW_BRACKET_LIMIT => LOW_BRACKET_FEE,
        ShippingMode::Table if price_cents < MID_BRACKET_LIMIT => MID_BRACKET_FEE,
        ShippingMode::Table => HIGH_BRACKET_FEE,
    }
}

/// Percentage fee on the item price, rounded to the nearest cent
pub fn handling_fee(fee_percent: f64, price_cents: i64) -> i64 {
    (price_cents as f64 * fee_percent / 100.0).round() as i64
}
