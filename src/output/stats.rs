//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! catalog statistics from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::TideError;

/// Catalog statistics summary
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    /// Total number of canonical products
    pub total_products: u64,

    /// Number of external identifiers mapped to products
    pub total_identifiers: u64,

    /// Total number of stored offers
    pub total_offers: u64,

    /// Offer counts per source, sorted by source name
    pub offers_by_source: Vec<(String, u64)>,

    /// Most recent ingestion run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CatalogStatistics)` - Successfully loaded statistics
/// * `Err(TideError)` - Failed to query statistics
pub fn load_statistics<S>(storage: &S) -> Result<CatalogStatistics, TideError>
where
    S: Storage + ?Sized,
{
    Ok(CatalogStatistics {
        total_products: storage.count_products()?,
        total_identifiers: storage.count_identifiers()?,
        total_offers: storage.count_offers()?,
        offers_by_source: storage.count_offers_by_source()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CatalogStatistics) {
    println!("=== Catalog Statistics ===\n");

    println!("Overview:");
    println!("  Products: {}", stats.total_products);
    println!("  Identifiers: {}", stats.total_identifiers);
    println!("  Offers: {}", stats.total_offers);
    println!();

    if !stats.offers_by_source.is_empty() {
        println!("Offers by Source:");
        for (source, count) in &stats.offers_by_source {
            let percentage = if stats.total_offers > 0 {
                (*count as f64 / stats.total_offers as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", source, count, percentage);
        }
        println!();
    }

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run:");
            println!("  ID: {}", run.id);
            println!("  Selector: {}", run.selector);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!(
                "  Candidates: {} ({} created, {} matched)",
                run.counters.candidates, run.counters.products_created, run.counters.products_matched
            );
            println!("  Offers written: {}", run.counters.offers_written);
            println!("  Errors: {}", run.counters.errors);
        }
        None => println!("No ingestion runs recorded"),
    }
}
