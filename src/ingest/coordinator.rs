//! Ingestion coordinator
//!
//! Runs providers one after another. Within a provider, queries run in plan
//! order and candidates are processed one at a time; a failing search or
//! candidate is logged and counted without stopping the job.

use crate::config::IngestionConfig;
use crate::fetch::FetchError;
use crate::identity;
use crate::ingest::{JobReport, ProviderSelector, QueryPlan};
use crate::pricing::PricingNormalizer;
use crate::providers::{Candidate, Provider, ProviderRegistry};
use crate::storage::{lock_storage, RunStatus, SharedStorage, Storage};
use crate::TideError;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Extra pause after a search that ended rate limited
const RATE_LIMITED_PAUSE: Duration = Duration::from_secs(5);

/// Drives providers for a job and records the run
pub struct Coordinator {
    registry: Arc<ProviderRegistry>,
    storage: SharedStorage,
    pricing: PricingNormalizer,
    ingestion: IngestionConfig,
    config_hash: String,
    rate_limited_pause: Duration,
}

impl Coordinator {
    /// Creates a coordinator
    ///
    /// # Arguments
    ///
    /// * `registry` - Providers available to jobs
    /// * `storage` - Catalog storage, shared with the robots.txt cache
    /// * `pricing` - Normalizer applied to every offer before it is stored
    /// * `ingestion` - Per-provider query plan overrides
    /// * `config_hash` - Recorded with each run
    pub fn new(
        registry: Arc<ProviderRegistry>,
        storage: SharedStorage,
        pricing: PricingNormalizer,
        ingestion: IngestionConfig,
        config_hash: String,
    ) -> Self {
        Self {
            registry,
            storage,
            pricing,
            ingestion,
            config_hash,
            rate_limited_pause: RATE_LIMITED_PAUSE,
        }
    }

    /// Overrides the pause taken after a rate-limited search
    pub fn with_rate_limited_pause(mut self, pause: Duration) -> Self {
        self.rate_limited_pause = pause;
        self
    }

    /// Query plan used for a provider
    pub fn plan_for(&self, provider: &str) -> QueryPlan {
        QueryPlan::for_provider(provider, &self.ingestion)
    }

    /// Runs a job for the selected providers
    ///
    /// A run record is created before any provider is touched and completed
    /// with the final counters. Cancellation stops the job between steps and
    /// completes the run as `cancelled`.
    ///
    /// # Returns
    ///
    /// * `Ok(JobReport)` - The job finished or was cancelled
    /// * `Err(TideError)` - The run record could not be written
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        selector: &ProviderSelector,
    ) -> Result<JobReport, TideError> {
        let run_id =
            lock_storage(&self.storage).create_run(&selector.to_string(), &self.config_hash)?;
        let mut report = JobReport::new(run_id, selector);
        let started = Instant::now();

        tracing::info!("Starting ingestion run {} for {}", run_id, selector);

        let names = match selector {
            ProviderSelector::All => self.registry.names(),
            ProviderSelector::Named(name) => vec![name.clone()],
        };

        let mut cancelled = false;
        for name in names {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let Some(provider) = self.registry.get(&name) else {
                tracing::warn!("Provider {} not found or disabled", name);
                report.unknown_providers.push(name);
                continue;
            };

            report.providers_run += 1;
            if let Err(e) = self.run_provider(cancel, provider.as_ref(), &mut report).await {
                if e.is_cancelled() {
                    cancelled = true;
                    break;
                }
                tracing::error!("Provider {} failed: {}", name, e);
            }
        }

        report.status = if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        lock_storage(&self.storage).complete_run(run_id, report.status, &report.counters())?;

        tracing::info!(
            "Run {} {}: {} candidates, {} created, {} matched, {} offers, {} errors in {:?}",
            run_id,
            report.status.to_db_string(),
            report.candidates,
            report.products_created,
            report.products_matched(),
            report.offers_written,
            report.errors(),
            started.elapsed()
        );

        Ok(report)
    }

    /// Runs one provider's query plan
    ///
    /// Only cancellation is returned as an error.
    async fn run_provider(
        &self,
        cancel: &CancellationToken,
        provider: &dyn Provider,
        report: &mut JobReport,
    ) -> Result<(), TideError> {
        let name = provider.name();
        let plan = self.plan_for(name);
        tracing::info!("Running {} with {} queries", name, plan.queries.len());

        for (i, query) in plan.queries.iter().enumerate() {
            if i > 0 && !plan.query_delay.is_zero() {
                pause(cancel, plan.query_delay).await?;
            }

            let candidates = match provider.search(cancel, query).await {
                Ok(candidates) => candidates,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    report.search_errors += 1;
                    tracing::error!("Search {:?} on {} failed: {}", query, name, e);
                    if is_rate_limited(&e) {
                        tracing::warn!(
                            "{} is rate limiting, pausing {:?}",
                            name,
                            self.rate_limited_pause
                        );
                        pause(cancel, self.rate_limited_pause).await?;
                    }
                    continue;
                }
            };

            tracing::debug!("{} returned {} candidates for {:?}", name, candidates.len(), query);

            for candidate in candidates.iter().take(plan.cap()) {
                if cancel.is_cancelled() {
                    return Err(TideError::Cancelled);
                }

                report.candidates += 1;
                match self.process_candidate(cancel, provider, candidate, report).await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        report.candidate_errors += 1;
                        tracing::error!(
                            "Failed to process candidate {:?} from {}: {}",
                            candidate.title,
                            name,
                            e
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Resolves a candidate, then refreshes its offers from the provider
    ///
    /// If fetching offers fails, the product keeps its previous offers from
    /// this source.
    async fn process_candidate(
        &self,
        cancel: &CancellationToken,
        provider: &dyn Provider,
        candidate: &Candidate,
        report: &mut JobReport,
    ) -> Result<(), TideError> {
        let resolution = {
            let mut storage = lock_storage(&self.storage);
            identity::resolve(&mut *storage, candidate)?
        };
        report.record_outcome(resolution.outcome);

        let product = resolution.product;
        let source = provider.name();

        let mut offers = provider.fetch_offers(cancel, &product).await?;

        let now = Utc::now();
        for offer in &mut offers {
            offer.source = source.to_string();
            self.pricing.normalize(offer, now);
        }

        let summary = lock_storage(&self.storage).replace_offers(product.id, source, &offers)?;
        report.offers_written += summary.upserted as u32;
        report.offers_deleted += summary.deleted as u32;

        tracing::debug!(
            "Product {} ({:?}): {} offers from {}, {} removed",
            product.id,
            resolution.outcome,
            summary.upserted,
            source,
            summary.deleted
        );

        Ok(())
    }
}

/// Sleeps unless the job is cancelled first
async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<(), TideError> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(TideError::Cancelled),
    }
}

/// Returns true if a search gave up on HTTP 429
fn is_rate_limited(error: &TideError) -> bool {
    matches!(
        error,
        TideError::Fetch(FetchError::RetriesExhausted {
            last_status: Some(429),
            ..
        })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingConfig;
    use crate::providers::DemoProvider;
    use crate::storage::SqliteStorage;
    use std::sync::Mutex;

    fn coordinator() -> (Coordinator, SharedStorage) {
        let storage: SharedStorage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(DemoProvider::new()));

        let coordinator = Coordinator::new(
            Arc::new(registry),
            storage.clone(),
            PricingNormalizer::new(PricingConfig::default()),
            IngestionConfig::default(),
            "hash".to_string(),
        );
        (coordinator, storage)
    }

    #[tokio::test]
    async fn test_demo_run_populates_catalog() {
        let (coordinator, storage) = coordinator();
        let report = coordinator
            .run(&CancellationToken::new(), &ProviderSelector::All)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.providers_run, 1);
        assert_eq!(report.candidates, 3);
        assert_eq!(report.products_created, 3);
        assert_eq!(report.offers_written, 9);
        assert_eq!(report.errors(), 0);

        let storage = storage.lock().unwrap();
        assert_eq!(storage.count_products().unwrap(), 3);
        assert_eq!(storage.count_offers().unwrap(), 9);

        let run = storage.get_run(report.run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.selector, "all");
        assert_eq!(run.config_hash, "hash");
        assert_eq!(run.counters, report.counters());
    }

    #[tokio::test]
    async fn test_offers_are_normalized() {
        let (coordinator, storage) = coordinator();
        coordinator
            .run(&CancellationToken::new(), &ProviderSelector::Named("demo".to_string()))
            .await
            .unwrap();

        let storage = storage.lock().unwrap();
        let product = storage
            .find_product_by_title("Smart Watch Pro")
            .unwrap()
            .unwrap();
        let offers = storage.offers_for_product(product.id).unwrap();
        let pricing = PricingNormalizer::new(PricingConfig::default());

        assert_eq!(offers.len(), 3);
        for offer in &offers {
            assert_eq!(offer.total_cents, pricing.total(offer.price_cents));
            assert!(offer.price_updated_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_second_run_matches_by_title() {
        let (coordinator, storage) = coordinator();
        let cancel = CancellationToken::new();
        coordinator.run(&cancel, &ProviderSelector::All).await.unwrap();
        let report = coordinator.run(&cancel, &ProviderSelector::All).await.unwrap();

        assert_eq!(report.products_created, 0);
        assert_eq!(report.matched_by_title, 3);
        assert_eq!(report.offers_deleted, 0);

        let storage = storage.lock().unwrap();
        assert_eq!(storage.count_products().unwrap(), 3);
        assert_eq!(storage.count_offers().unwrap(), 9);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_counted() {
        let (coordinator, _storage) = coordinator();
        let report = coordinator
            .run(
                &CancellationToken::new(),
                &ProviderSelector::Named("nope".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.unknown_providers, vec!["nope"]);
        assert_eq!(report.providers_run, 0);
        assert_eq!(report.errors(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (coordinator, storage) = coordinator();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = coordinator.run(&cancel, &ProviderSelector::All).await.unwrap();
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.candidates, 0);

        let storage = storage.lock().unwrap();
        assert_eq!(
            storage.get_run(report.run_id).unwrap().status,
            RunStatus::Cancelled
        );
        assert_eq!(storage.count_products().unwrap(), 0);
    }

    #[test]
    fn test_rate_limited_detection() {
        let limited = TideError::Fetch(FetchError::RetriesExhausted {
            url: "https://a.example.com".to_string(),
            attempts: 3,
            last_status: Some(429),
            cause: "HTTP 429".to_string(),
        });
        let server = TideError::Fetch(FetchError::RetriesExhausted {
            url: "https://a.example.com".to_string(),
            attempts: 3,
            last_status: Some(503),
            cause: "HTTP 503".to_string(),
        });

        assert!(is_rate_limited(&limited));
        assert!(!is_rate_limited(&server));
        assert!(!is_rate_limited(&TideError::Cancelled));
    }
}
