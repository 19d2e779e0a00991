use crate::config::{IngestionConfig, QueryPlanEntry};
use std::time::Duration;

/// Candidates taken from one search when nothing else is configured
pub const DEFAULT_MAX_RESULTS_PER_QUERY: usize = 5;

/// Search queries run against one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub queries: Vec<String>,
    /// Cap on candidates processed per query
    pub max_results_per_query: Option<usize>,
    /// Pause between consecutive queries
    pub query_delay: Duration,
}

impl QueryPlan {
    /// Built-in plan for a provider name
    ///
    /// `live` is the conventional name of an `[[html-providers]]` entry.
    /// Other providers get a single empty query, which listing sources
    /// treat as "everything". Every built-in plan is capped.
    pub fn builtin(provider: &str) -> Self {
        let queries: &[&str] = match provider {
            "demo" => &["headphones", "watch", "cable"],
            "live" => &["headphones", "watch", "laptop"],
            _ => &[""],
        };
        Self::new(queries, Some(DEFAULT_MAX_RESULTS_PER_QUERY), 0)
    }

    /// Plan for a provider: the configured entry over the built-in plan
    ///
    /// An entry with no queries keeps the built-in queries, and one with
    /// no cap keeps the built-in cap.
    pub fn for_provider(provider: &str, config: &IngestionConfig) -> Self {
        let builtin = Self::builtin(provider);
        match config.providers.get(provider) {
            Some(entry) => Self::from_entry(entry, builtin),
            None => builtin,
        }
    }

    fn from_entry(entry: &QueryPlanEntry, fallback: Self) -> Self {
        let queries = if entry.queries.is_empty() {
            fallback.queries
        } else {
            entry.queries.clone()
        };

        Self {
            queries,
            max_results_per_query: entry
                .max_results_per_query
                .or(fallback.max_results_per_query),
            query_delay: Duration::from_millis(entry.query_delay_ms),
        }
    }

    fn new(queries: &[&str], max_results_per_query: Option<usize>, delay_ms: u64) -> Self {
        Self {
            queries: queries.iter().map(|q| q.to_string()).collect(),
            max_results_per_query,
            query_delay: Duration::from_millis(delay_ms),
        }
    }

    /// Number of candidates to take from one search result
    pub fn cap(&self) -> usize {
        self.max_results_per_query.unwrap_or(usize::MAX)
    }
}
