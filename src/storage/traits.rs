//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{
    IdentifierRecord, NewOffer, NewProduct, OfferRecord, ProductRecord, ReplaceSummary,
    RunCounters, RunRecord, RunStatus,
};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Identifier {kind}/{value} already belongs to product {product_id}")]
    IdentifierConflict {
        kind: String,
        value: String,
        product_id: i64,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Calls are synchronous; callers sharing a backend wrap it in a mutex and
/// never hold the lock across an `.await`.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new ingestion run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `selector` - Provider selector the run was started with
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, selector: &str, config_hash: &str) -> StorageResult<i64>;

    /// Finishes a run with its final status and counters
    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Products =====

    /// Inserts a new product and returns it
    fn insert_product(&mut self, product: &NewProduct) -> StorageResult<ProductRecord>;

    fn get_product(&self, product_id: i64) -> StorageResult<Option<ProductRecord>>;

    /// Persists the display fields of an existing product and bumps `updated_at`
    fn update_product(&mut self, product: &ProductRecord) -> StorageResult<ProductRecord>;

    /// Finds the oldest product whose title is exactly `title`
    fn find_product_by_title(&self, title: &str) -> StorageResult<Option<ProductRecord>>;

    /// Finds the product an identifier is mapped to
    fn find_product_by_identifier(
        &self,
        kind: &str,
        value: &str,
    ) -> StorageResult<Option<ProductRecord>>;

    // ===== Identifiers =====

    /// Maps (kind, value) to a product
    ///
    /// Mapping a pair to the product it already belongs to is a no-op;
    /// mapping it to a different product is an `IdentifierConflict`.
    fn insert_identifier(&mut self, product_id: i64, kind: &str, value: &str)
        -> StorageResult<()>;

    fn identifiers_for_product(&self, product_id: i64) -> StorageResult<Vec<IdentifierRecord>>;

    // ===== Offers =====

    /// Replaces the offers of one (product, source) in a single transaction
    ///
    /// Existing offers whose (seller, url-or-empty) key is absent from
    /// `offers` are deleted; every offer in `offers` is then upserted by
    /// that key.
    fn replace_offers(
        &mut self,
        product_id: i64,
        source: &str,
        offers: &[NewOffer],
    ) -> StorageResult<ReplaceSummary>;

    /// Gets all offers of a product, cheapest total first
    fn offers_for_product(&self, product_id: i64) -> StorageResult<Vec<OfferRecord>>;

    // ===== Statistics =====

    fn count_products(&self) -> StorageResult<u64>;

    fn count_identifiers(&self) -> StorageResult<u64>;

    fn count_offers(&self) -> StorageResult<u64>;

    /// Offer counts grouped by source, sorted by source name
    fn count_offers_by_source(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Key-Value Cache =====

    /// Gets a cached value if present and not expired
    fn cache_get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores a value that expires after `ttl`
    fn cache_set(&mut self, key: &str, value: &[u8], ttl: Duration) -> StorageResult<()>;
}
