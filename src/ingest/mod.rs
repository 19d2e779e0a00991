//! Ingestion coordination
//!
//! This module drives providers for a job:
//! - Selecting providers from a job trigger
//! - Running each provider's query plan
//! - Resolving candidates, refreshing offers and recording the run

mod coordinator;
mod plan;

pub use coordinator::Coordinator;
pub use plan::{QueryPlan, DEFAULT_MAX_RESULTS_PER_QUERY};

use crate::identity::MatchOutcome;
use crate::storage::{RunCounters, RunStatus};
use crate::TideError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which providers a job runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSelector {
    /// Every enabled provider, in sorted order
    All,
    Named(String),
}

impl ProviderSelector {
    /// Parses a selector; `all` (any case) selects every provider
    pub fn parse(value: &str) -> Result<Self, TideError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(TideError::ProviderNotFound(String::new()));
        }
        if value.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            Ok(Self::Named(value.to_string()))
        }
    }
}

impl FromStr for ProviderSelector {
    type Err = TideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ProviderSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Queue message that triggers a price refresh
///
/// ```
/// use pricetide::ingest::{FetchPricesJob, ProviderSelector};
///
/// let job = FetchPricesJob::from_json(r#"{"source":"all"}"#).unwrap();
/// assert_eq!(job.selector().unwrap(), ProviderSelector::All);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPricesJob {
    pub source: String,
}

impl FetchPricesJob {
    /// Decodes a job from its JSON payload
    pub fn from_json(payload: &str) -> Result<Self, TideError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_json(&self) -> Result<String, TideError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn selector(&self) -> Result<ProviderSelector, TideError> {
        ProviderSelector::parse(&self.source)
    }
}

/// Summary of one coordinator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub run_id: i64,
    pub selector: String,
    pub status: RunStatus,
    /// Providers whose query plan was started
    pub providers_run: u32,
    /// Selected names with no enabled provider
    pub unknown_providers: Vec<String>,
    pub candidates: u32,
    pub products_created: u32,
    pub matched_by_identifier: u32,
    pub matched_by_title: u32,
    pub offers_written: u32,
    pub offers_deleted: u32,
    pub search_errors: u32,
    pub candidate_errors: u32,
}

impl JobReport {
    pub(crate) fn new(run_id: i64, selector: &ProviderSelector) -> Self {
        Self {
            run_id,
            selector: selector.to_string(),
            status: RunStatus::Running,
            providers_run: 0,
            unknown_providers: Vec::new(),
            candidates: 0,
            products_created: 0,
            matched_by_identifier: 0,
            matched_by_title: 0,
            offers_written: 0,
            offers_deleted: 0,
            search_errors: 0,
            candidate_errors: 0,
        }
    }

    pub(crate) fn record_outcome(&mut self, outcome: MatchOutcome) {
        match outcome {
            MatchOutcome::Created => self.products_created += 1,
            MatchOutcome::MatchedByIdentifier => self.matched_by_identifier += 1,
            MatchOutcome::MatchedByTitle => self.matched_by_title += 1,
        }
    }

    /// All failures: unknown providers, searches and candidates
    pub fn errors(&self) -> u32 {
        self.unknown_providers.len() as u32 + self.search_errors + self.candidate_errors
    }

    pub fn products_matched(&self) -> u32 {
        self.matched_by_identifier + self.matched_by_title
    }

    /// Counters stored with the run record
    pub fn counters(&self) -> RunCounters {
        RunCounters {
            providers: self.providers_run,
            candidates: self.candidates,
            products_created: self.products_created,
            products_matched: self.products_matched(),
            offers_written: self.offers_written,
            errors: self.errors(),
        }
    }
}
