//! Integration tests for the ingestion coordinator
//!
//! These tests drive the coordinator with scripted in-process providers and
//! check identity merging, offer replacement and failure isolation against a
//! real SQLite database.

use async_trait::async_trait;
use pricetide::config::{IngestionConfig, PricingConfig, QueryPlanEntry};
use pricetide::identity::MatchOutcome;
use pricetide::ingest::{Coordinator, FetchPricesJob, ProviderSelector};
use pricetide::pricing::PricingNormalizer;
use pricetide::providers::{Candidate, Identifier, Provider, ProviderRegistry};
use pricetide::storage::{
    open_storage, NewOffer, ProductRecord, RunStatus, SharedStorage, Storage,
};
use pricetide::TideError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Offers a scripted provider returns for a product title
#[derive(Clone)]
enum Script {
    Sellers(Vec<(&'static str, i64)>),
    Fail,
}

/// Provider returning fixed candidates and per-title offers
struct ScriptedProvider {
    name: &'static str,
    candidates: Vec<Candidate>,
    failing_queries: Vec<&'static str>,
    offers: Mutex<HashMap<String, Script>>,
}

impl ScriptedProvider {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            candidates: Vec::new(),
            failing_queries: Vec::new(),
            offers: Mutex::new(HashMap::new()),
        }
    }

    fn candidate(mut self, title: &str, identifier: Option<(&str, &str)>) -> Self {
        let mut candidate = Candidate::new(self.name, title);
        candidate.identifier = identifier.map(|(kind, value)| Identifier::new(kind, value));
        self.candidates.push(candidate);
        self
    }

    fn failing_query(mut self, query: &'static str) -> Self {
        self.failing_queries.push(query);
        self
    }

    fn script(&self, title: &str, script: Script) {
        self.offers.lock().unwrap().insert(title.to_string(), script);
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn search(
        &self,
        _cancel: &CancellationToken,
        query: &str,
    ) -> Result<Vec<Candidate>, TideError> {
        if self.failing_queries.iter().any(|failing| *failing == query) {
            return Err(TideError::Provider {
                provider: self.name.to_string(),
                message: format!("search for {} failed", query),
            });
        }
        Ok(self.candidates.clone())
    }

    async fn fetch_offers(
        &self,
        _cancel: &CancellationToken,
        product: &ProductRecord,
    ) -> Result<Vec<NewOffer>, TideError> {
        let script = self.offers.lock().unwrap().get(&product.title).cloned();
        match script {
            Some(Script::Sellers(sellers)) => Ok(sellers
                .into_iter()
                .map(|(seller, price)| {
                    let mut offer = NewOffer::new(self.name, seller, price, "USD");
                    offer.url = Some(format!("https://{}.example.com/{}", self.name, seller));
                    offer
                })
                .collect()),
            Some(Script::Fail) => Err(TideError::Provider {
                provider: self.name.to_string(),
                message: "offer page unavailable".to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

struct Harness {
    coordinator: Coordinator,
    storage: SharedStorage,
    _dir: TempDir,
}

fn harness(providers: Vec<Arc<ScriptedProvider>>, ingestion: IngestionConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let storage: SharedStorage = Arc::new(Mutex::new(
        open_storage(&dir.path().join("catalog.db")).unwrap(),
    ));

    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider);
    }

    let coordinator = Coordinator::new(
        Arc::new(registry),
        storage.clone(),
        PricingNormalizer::new(PricingConfig::default()),
        ingestion,
        "test-hash".to_string(),
    );

    Harness {
        coordinator,
        storage,
        _dir: dir,
    }
}

fn plan(queries: &[&str], cap: Option<usize>) -> QueryPlanEntry {
    QueryPlanEntry {
        enabled: true,
        queries: queries.iter().map(|q| q.to_string()).collect(),
        max_results_per_query: cap,
        query_delay_ms: 0,
    }
}

fn offer_sellers(storage: &SharedStorage, product_id: i64, source: &str) -> Vec<String> {
    let storage = storage.lock().unwrap();
    let mut sellers: Vec<String> = storage
        .offers_for_product(product_id)
        .unwrap()
        .into_iter()
        .filter(|offer| offer.source == source)
        .map(|offer| offer.seller)
        .collect();
    sellers.sort();
    sellers
}

fn product_id(storage: &SharedStorage, title: &str) -> i64 {
    storage
        .lock()
        .unwrap()
        .find_product_by_title(title)
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn test_shared_identifier_merges_across_providers() {
    let shop_a = Arc::new(
        ScriptedProvider::new("shop_a").candidate("Sony WH-1000XM5", Some(("upc", "027242923782"))),
    );
    shop_a.script("Sony WH-1000XM5", Script::Sellers(vec![("Store A", 34999)]));

    let shop_b = Arc::new(ScriptedProvider::new("shop_b").candidate(
        "Sony Noise Cancelling Headphones WH1000XM5 Black",
        Some(("upc", "027242923782")),
    ));
    shop_b.script("Sony WH-1000XM5", Script::Sellers(vec![("Store B", 32999)]));

    let h = harness(vec![shop_a, shop_b], IngestionConfig::default());
    let report = h
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::All)
        .await
        .unwrap();

    assert_eq!(report.providers_run, 2);
    assert_eq!(report.products_created, 1);
    assert_eq!(report.matched_by_identifier, 1);

    let storage = h.storage.lock().unwrap();
    assert_eq!(storage.count_products().unwrap(), 1);
    assert_eq!(storage.count_identifiers().unwrap(), 1);

    let product = storage
        .find_product_by_identifier("upc", "027242923782")
        .unwrap()
        .unwrap();
    assert_eq!(product.title, "Sony WH-1000XM5");

    let offers = storage.offers_for_product(product.id).unwrap();
    assert_eq!(offers.len(), 2);
    // Cheapest landed total first
    assert_eq!(offers[0].source, "shop_b");
    assert_eq!(offers[1].source, "shop_a");
}

#[tokio::test]
async fn test_candidate_without_identifier_creates_product() {
    let shop_a = Arc::new(ScriptedProvider::new("shop_a").candidate("USB-C Cable 2m", None));
    let shop_b = Arc::new(ScriptedProvider::new("shop_b").candidate("USB C Cable (2 m)", None));

    let h = harness(vec![shop_a, shop_b], IngestionConfig::default());
    let report = h
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::All)
        .await
        .unwrap();

    assert_eq!(report.products_created, 2);
    assert_eq!(report.products_matched(), 0);
    assert_eq!(h.storage.lock().unwrap().count_products().unwrap(), 2);
}

#[tokio::test]
async fn test_failing_candidate_does_not_stop_batch() {
    let shop = Arc::new(
        ScriptedProvider::new("shop_a")
            .candidate("Widget One", None)
            .candidate("Widget Two", None)
            .candidate("   ", None)
            .candidate("Widget Three", None),
    );
    shop.script("Widget One", Script::Sellers(vec![("Store A", 999)]));
    shop.script("Widget Two", Script::Fail);
    shop.script("Widget Three", Script::Sellers(vec![("Store A", 1999)]));

    let h = harness(vec![shop], IngestionConfig::default());
    let report = h
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::All)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.candidates, 4);
    assert_eq!(report.candidate_errors, 2);
    assert_eq!(report.offers_written, 2);

    assert_eq!(
        offer_sellers(&h.storage, product_id(&h.storage, "Widget Three"), "shop_a"),
        vec!["Store A"]
    );

    let run = h.storage.lock().unwrap().get_run(report.run_id).unwrap();
    assert_eq!(run.counters.errors, 2);
}

#[tokio::test]
async fn test_offers_replaced_per_source() {
    let shop_a = Arc::new(ScriptedProvider::new("shop_a").candidate("Smart Watch Pro", None));
    shop_a.script(
        "Smart Watch Pro",
        Script::Sellers(vec![("Store A", 4999), ("Store B", 5499)]),
    );
    let shop_b = Arc::new(ScriptedProvider::new("shop_b").candidate("Smart Watch Pro", None));
    shop_b.script("Smart Watch Pro", Script::Sellers(vec![("Store C", 4799)]));

    let h = harness(vec![shop_a.clone(), shop_b], IngestionConfig::default());
    let cancel = CancellationToken::new();
    h.coordinator.run(&cancel, &ProviderSelector::All).await.unwrap();

    let id = product_id(&h.storage, "Smart Watch Pro");
    assert_eq!(offer_sellers(&h.storage, id, "shop_a"), vec!["Store A", "Store B"]);

    shop_a.script("Smart Watch Pro", Script::Sellers(vec![("Store A", 4899)]));
    let report = h
        .coordinator
        .run(&cancel, &ProviderSelector::Named("shop_a".to_string()))
        .await
        .unwrap();

    assert_eq!(report.offers_written, 1);
    assert_eq!(report.offers_deleted, 1);
    assert_eq!(offer_sellers(&h.storage, id, "shop_a"), vec!["Store A"]);
    assert_eq!(offer_sellers(&h.storage, id, "shop_b"), vec!["Store C"]);

    let offers = h.storage.lock().unwrap().offers_for_product(id).unwrap();
    let store_a = offers.iter().find(|o| o.seller == "Store A").unwrap();
    assert_eq!(store_a.price_cents, 4899);
}

#[tokio::test]
async fn test_failed_offer_fetch_keeps_previous_offers() {
    let shop = Arc::new(ScriptedProvider::new("shop_a").candidate("Smart Watch Pro", None));
    shop.script(
        "Smart Watch Pro",
        Script::Sellers(vec![("Store A", 4999), ("Store B", 5499)]),
    );

    let h = harness(vec![shop.clone()], IngestionConfig::default());
    let cancel = CancellationToken::new();
    h.coordinator.run(&cancel, &ProviderSelector::All).await.unwrap();

    shop.script("Smart Watch Pro", Script::Fail);
    let report = h.coordinator.run(&cancel, &ProviderSelector::All).await.unwrap();

    assert_eq!(report.candidate_errors, 1);
    assert_eq!(report.matched_by_title, 1);

    let id = product_id(&h.storage, "Smart Watch Pro");
    assert_eq!(offer_sellers(&h.storage, id, "shop_a"), vec!["Store A", "Store B"]);
}

#[tokio::test]
async fn test_search_failure_skips_only_that_query() {
    let shop = Arc::new(
        ScriptedProvider::new("shop_a")
            .candidate("Widget", None)
            .failing_query("broken"),
    );

    let mut ingestion = IngestionConfig::default();
    ingestion
        .providers
        .insert("shop_a".to_string(), plan(&["broken", "widgets"], None));

    let h = harness(vec![shop], ingestion);
    let report = h
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::All)
        .await
        .unwrap();

    assert_eq!(report.search_errors, 1);
    assert_eq!(report.candidates, 1);
    assert_eq!(report.products_created, 1);
}

#[tokio::test]
async fn test_results_capped_per_query() {
    let shop = Arc::new(
        ScriptedProvider::new("shop_a")
            .candidate("Widget One", None)
            .candidate("Widget Two", None)
            .candidate("Widget Three", None),
    );

    let mut ingestion = IngestionConfig::default();
    ingestion
        .providers
        .insert("shop_a".to_string(), plan(&["a", "b"], Some(2)));

    let h = harness(vec![shop], ingestion);
    let report = h
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::All)
        .await
        .unwrap();

    // Both queries return the same two capped candidates
    assert_eq!(report.candidates, 4);
    assert_eq!(report.products_created, 2);
    assert_eq!(report.matched_by_title, 2);
    assert!(h
        .storage
        .lock()
        .unwrap()
        .find_product_by_title("Widget Three")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_job_payload_selects_provider() {
    let shop_a = Arc::new(ScriptedProvider::new("shop_a").candidate("Widget A", None));
    let shop_b = Arc::new(ScriptedProvider::new("shop_b").candidate("Widget B", None));
    let h = harness(vec![shop_a, shop_b], IngestionConfig::default());

    let job = FetchPricesJob::from_json(r#"{"source":"shop_b"}"#).unwrap();
    let report = h
        .coordinator
        .run(&CancellationToken::new(), &job.selector().unwrap())
        .await
        .unwrap();

    assert_eq!(report.selector, "shop_b");
    assert_eq!(report.providers_run, 1);

    let storage = h.storage.lock().unwrap();
    assert!(storage.find_product_by_title("Widget A").unwrap().is_none());
    assert!(storage.find_product_by_title("Widget B").unwrap().is_some());
    assert_eq!(storage.get_latest_run().unwrap().unwrap().selector, "shop_b");
}

#[tokio::test]
async fn test_identifier_match_wins_over_title_match() {
    let shop_a = Arc::new(
        ScriptedProvider::new("shop_a")
            .candidate("Gaming Mouse", None)
            .candidate("Precision Mouse", Some(("sku", "M-1"))),
    );
    let shop_b = Arc::new(
        ScriptedProvider::new("shop_b").candidate("Gaming Mouse", Some(("sku", "M-1"))),
    );

    let h = harness(vec![shop_a, shop_b], IngestionConfig::default());
    let report = h
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::All)
        .await
        .unwrap();

    assert_eq!(report.products_created, 2);
    assert_eq!(report.matched_by_identifier, 1);
    assert_eq!(report.matched_by_title, 0);

    let storage = h.storage.lock().unwrap();
    let by_id = storage.find_product_by_identifier("sku", "M-1").unwrap().unwrap();
    assert_eq!(by_id.title, "Precision Mouse");

    // The outcome type is part of the public surface
    assert!(MatchOutcome::Created.is_created());
}
