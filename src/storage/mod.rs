//! Storage module for catalog data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Canonical products and their external identifiers
//! - Source-scoped offer replacement
//! - Ingestion run tracking
//! - A key-value cache with expiry (backs the persistent robots.txt tier)

mod cache;
mod schema;
mod sqlite;
mod traits;

pub use cache::SqliteCache;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::TideError;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage shared between the coordinator and the cache adapter
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(TideError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, TideError> {
    SqliteStorage::new(path)
}

/// Locks shared storage, recovering from a poisoned mutex
///
/// Unfinished transactions roll back on drop, so a poisoned connection is
/// still consistent.
pub fn lock_storage(storage: &Mutex<SqliteStorage>) -> MutexGuard<'_, SqliteStorage> {
    storage.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Storage mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Canonical product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub id: i64,
    pub title: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for a product that does not exist yet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProduct {
    pub title: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub image_url: Option<String>,
}

/// External identifier mapped to a product
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierRecord {
    pub id: i64,
    pub product_id: i64,
    pub kind: String,
    pub value: String,
    pub created_at: String,
}

/// Stock state of an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    InStock,
    OutOfStock,
    Unknown,
}

impl Availability {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::OutOfStock => "out_of_stock",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "in_stock" => Some(Self::InStock),
            "out_of_stock" => Some(Self::OutOfStock),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn from_in_stock(in_stock: bool) -> Self {
        if in_stock {
            Self::InStock
        } else {
            Self::OutOfStock
        }
    }
}

/// An offer as produced by a provider, before it is stored
///
/// Amounts are integers in minor currency units (cents).
#[derive(Debug, Clone, PartialEq)]
pub struct NewOffer {
    pub source: String,
    pub seller: String,
    pub price_cents: i64,
    pub currency: String,
    pub shipping_cents: i64,
    pub fee_cents: i64,
    pub tax_cents: Option<i64>,
    pub total_cents: i64,
    pub availability: Availability,
    pub url: Option<String>,
    pub est_delivery_days_min: Option<u32>,
    pub est_delivery_days_max: Option<u32>,
    pub price_updated_at: Option<String>,
}

impl NewOffer {
    /// Creates an offer with only a price; the pricing normalizer fills in
    /// shipping, fee and total
    pub fn new(source: &str, seller: &str, price_cents: i64, currency: &str) -> Self {
        Self {
            source: source.to_string(),
            seller: seller.to_string(),
            price_cents,
            currency: currency.to_string(),
            shipping_cents: 0,
            fee_cents: 0,
            tax_cents: None,
            total_cents: price_cents,
            availability: Availability::Unknown,
            url: None,
            est_delivery_days_min: None,
            est_delivery_days_max: None,
            price_updated_at: None,
        }
    }

    /// Uniqueness key within a (product, source): seller plus url-or-empty
    pub fn key(&self) -> (String, String) {
        (self.seller.clone(), self.url.clone().unwrap_or_default())
    }
}

/// A stored offer
#[derive(Debug, Clone, PartialEq)]
pub struct OfferRecord {
    pub id: i64,
    pub product_id: i64,
    pub source: String,
    pub seller: String,
    pub price_cents: i64,
    pub currency: String,
    pub shipping_cents: i64,
    pub fee_cents: i64,
    pub tax_cents: Option<i64>,
    pub total_cents: i64,
    pub availability: Availability,
    pub url: Option<String>,
    pub est_delivery_days_min: Option<u32>,
    pub est_delivery_days_max: Option<u32>,
    pub fetched_at: String,
    pub price_updated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Outcome of a source-scoped offer replacement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub upserted: usize,
    pub deleted: usize,
}

/// Represents an ingestion run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub selector: String,
    pub config_hash: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub counters: RunCounters,
}

/// Counters recorded when a run completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub providers: u32,
    pub candidates: u32,
    pub products_created: u32,
    pub products_matched: u32,
    pub offers_written: u32,
    pub errors: u32,
}

/// Status of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
