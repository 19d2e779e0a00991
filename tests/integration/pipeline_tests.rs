//! End-to-end tests for the ingestion pipeline
//!
//! These tests use wiremock to stand in for a listing site and wire the
//! components together the same way the binary does.

use pricetide::audit::MemoryAuditSink;
use pricetide::config::{parse_config, Config};
use pricetide::ingest::{Coordinator, ProviderSelector};
use pricetide::pricing::PricingNormalizer;
use pricetide::providers::build_registry;
use pricetide::ratelimit::RateLimiterManager;
use pricetide::robots::RobotsChecker;
use pricetide::storage::{open_storage, RunStatus, SharedStorage, SqliteCache, Storage};
use pricetide::FetchClient;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PAGE: &str = r#"
<html><body>
  <div class="product-card" data-item-id="ATH-500BT">
    <h3 class="product-title">AudioTech Wireless Headphones</h3>
    <img src="/img/ath.jpg">
    <a href="/product/audiotech-wireless-headphones">Details</a>
  </div>
</body></html>
"#;

const PRODUCT_PAGE: &str = r#"
<html><body>
  <div class="vendor-row">
    <span class="store-name">Sound Shop</span>
    <span class="amount">$89.99</span>
    <a href="/buy/sound-shop">Buy</a>
  </div>
  <div class="vendor-row">
    <span class="store-name">Audio Outlet</span>
    <span class="amount">$94.50</span>
    <span class="stock">Out of stock</span>
    <a href="/buy/audio-outlet">Buy</a>
  </div>
</body></html>
"#;

struct Pipeline {
    coordinator: Coordinator,
    storage: SharedStorage,
    audit: Arc<MemoryAuditSink>,
    _dir: TempDir,
}

fn load(toml: &str, dir: &TempDir) -> Config {
    let db_path = dir.path().join("pricetide.db");
    let content = format!(
        "{}\n[storage]\ndatabase-path = {:?}\n",
        toml,
        db_path.display().to_string()
    );
    parse_config(&content).unwrap()
}

fn pipeline(toml: &str) -> Pipeline {
    let dir = TempDir::new().unwrap();
    let config = load(toml, &dir);

    let storage: SharedStorage = Arc::new(Mutex::new(
        open_storage(std::path::Path::new(&config.storage.database_path)).unwrap(),
    ));
    let robots = RobotsChecker::from_config(&config.fetch)
        .unwrap()
        .with_persistent_cache(Arc::new(SqliteCache::new(storage.clone())));
    let limiter = RateLimiterManager::from_config(&config.rate_limits);
    let audit = Arc::new(MemoryAuditSink::new());
    let fetch = FetchClient::new(
        config.fetch.clone(),
        Arc::new(limiter),
        Arc::new(robots),
        audit.clone(),
    )
    .unwrap();

    let registry = build_registry(&config, Arc::new(fetch)).unwrap();
    let coordinator = Coordinator::new(
        Arc::new(registry),
        storage.clone(),
        PricingNormalizer::new(config.pricing.clone()),
        config.ingestion.clone(),
        "pipeline".to_string(),
    );

    Pipeline {
        coordinator,
        storage,
        audit,
        _dir: dir,
    }
}

async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "headphones"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SEARCH_PAGE))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product/audiotech-wireless-headphones"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_PAGE))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_html_provider_end_to_end() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let p = pipeline(&format!(
        r#"
[rate-limits.providers.shop]
rps = 50.0
burst = 5

[ingestion.providers.shop]
queries = ["headphones"]

[[html-providers]]
name = "shop"
base-url = "{}"
identifier-kind = "model"
"#,
        server.uri()
    ));

    let report = p
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::Named("shop".to_string()))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.products_created, 1);
    assert_eq!(report.offers_written, 2);
    assert_eq!(report.errors(), 0);

    let storage = p.storage.lock().unwrap();
    let product = storage
        .find_product_by_identifier("model", "ATH-500BT")
        .unwrap()
        .unwrap();
    assert_eq!(product.title, "AudioTech Wireless Headphones");
    assert_eq!(product.brand.as_deref(), Some("AudioTech"));

    let offers = storage.offers_for_product(product.id).unwrap();
    assert_eq!(offers.len(), 2);
    assert_eq!(offers[0].seller, "Sound Shop");
    assert_eq!(offers[0].price_cents, 8999);
    // table mode: 1999 base + 3% fee
    assert_eq!(offers[0].total_cents, 8999 + 1999 + 270);
    assert_eq!(offers[1].seller, "Audio Outlet");
    assert_eq!(offers[1].source, "shop");

    let entries = p.audit.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.status == Some(200) && e.error.is_none()));
}

#[tokio::test]
async fn test_external_site_blocked_without_live_fetch() {
    let p = pipeline(
        r#"
[fetch]
allow-live-fetch = false

[ingestion.providers.shop]
queries = ["headphones", "watch"]

[[html-providers]]
name = "shop"
base-url = "https://shop.example.com"
"#,
    );

    let report = p
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::All)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.search_errors, 2);

    let blocked: Vec<_> = p
        .audit
        .entries()
        .into_iter()
        .filter(|e| e.provider == "shop")
        .collect();
    assert_eq!(blocked.len(), 2);
    assert!(blocked.iter().all(|e| !e.robots_allowed && e.status.is_none()));

    // The demo provider still runs in the same job
    assert_eq!(p.storage.lock().unwrap().count_products().unwrap(), 3);
}

#[tokio::test]
async fn test_disabled_provider_is_skipped() {
    let p = pipeline(
        r#"
[ingestion.providers.demo]
enabled = false
"#,
    );

    let report = p
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::All)
        .await
        .unwrap();
    assert_eq!(report.providers_run, 0);

    let report = p
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::Named("demo".to_string()))
        .await
        .unwrap();
    assert_eq!(report.unknown_providers, vec!["demo"]);
    assert_eq!(p.storage.lock().unwrap().count_products().unwrap(), 0);
}

#[tokio::test]
async fn test_server_errors_are_retried_then_counted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let p = pipeline(&format!(
        r#"
[fetch]
max-retries = 1
backoff-base-ms = 10
backoff-jitter-ms = 0

[ingestion.providers.shop]
queries = ["headphones"]

[[html-providers]]
name = "shop"
base-url = "{}"
"#,
        server.uri()
    ));

    let report = p
        .coordinator
        .run(&CancellationToken::new(), &ProviderSelector::Named("shop".to_string()))
        .await
        .unwrap();

    assert_eq!(report.search_errors, 1);
    assert_eq!(report.candidates, 0);

    let entries = p.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, Some(503));
    assert_eq!(entries[0].retry_count, 1);
}
