//! Output module for catalog reporting
//!
//! This module handles:
//! - Loading catalog statistics from storage
//! - Printing statistics for the `--stats` command

pub mod stats;

pub use stats::{load_statistics, print_statistics, CatalogStatistics};
