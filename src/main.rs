//! Pricetide main entry point
//!
//! This is the command-line interface for the Pricetide ingestion pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use pricetide::audit::TracingAuditSink;
use pricetide::config::{load_config_with_hash, Config};
use pricetide::ingest::{Coordinator, FetchPricesJob, ProviderSelector, QueryPlan};
use pricetide::pricing::PricingNormalizer;
use pricetide::providers::{build_registry, DEMO_PROVIDER_NAME};
use pricetide::ratelimit::RateLimiterManager;
use pricetide::robots::RobotsChecker;
use pricetide::storage::{open_storage, SqliteCache};
use pricetide::FetchClient;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Pricetide: compliant multi-provider price ingestion
///
/// Pricetide searches configured providers, merges the results into
/// canonical products and stores normalized offers, while respecting
/// robots.txt, per-provider rate limits and the live-fetch switch.
#[derive(Parser, Debug)]
#[command(name = "pricetide")]
#[command(version = "1.0.0")]
#[command(about = "Compliant multi-provider price ingestion", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Provider to run, or "all"
    #[arg(short, long, default_value = "all", conflicts_with = "payload")]
    provider: String,

    /// Job payload as JSON, e.g. '{"source":"all"}'
    #[arg(long)]
    payload: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the ingestion plan without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let selector = match &cli.payload {
        Some(payload) => FetchPricesJob::from_json(payload)
            .and_then(|job| job.selector())
            .context("invalid job payload")?,
        None => ProviderSelector::parse(&cli.provider).context("invalid provider selector")?,
    };

    if cli.dry_run {
        handle_dry_run(&config, &selector);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_ingest(config, config_hash, selector).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pricetide=info,warn"),
            1 => EnvFilter::new("pricetide=debug,info"),
            2 => EnvFilter::new("pricetide=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the ingestion plan
fn handle_dry_run(config: &Config, selector: &ProviderSelector) {
    println!("=== Pricetide Dry Run ===\n");

    println!("Fetch:");
    println!("  Live fetch: {}", config.fetch.allow_live_fetch);
    println!("  User agent: {}", config.fetch.user_agent);
    println!("  Timeout: {}s", config.fetch.http_timeout_seconds);
    println!("  Max retries: {}", config.fetch.max_retries);
    println!("  Robots cache TTL: {}h", config.fetch.robots_cache_ttl_hours);

    println!("\nRate Limits:");
    println!(
        "  default: {} rps, burst {}",
        config.rate_limits.default.rps, config.rate_limits.default.burst
    );
    let mut limits: Vec<_> = config.rate_limits.providers.iter().collect();
    limits.sort_by(|a, b| a.0.cmp(b.0));
    for (name, limit) in limits {
        println!("  {}: {} rps, burst {}", name, limit.rps, limit.burst);
    }

    println!("\nPricing:");
    println!("  Shipping mode: {:?}", config.pricing.mode);
    println!("  Fee: {}%", config.pricing.fee_percent);
    println!("  Exchange rate: {}", config.pricing.exchange_rate);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    let mut names = vec![DEMO_PROVIDER_NAME.to_string()];
    names.extend(config.html_providers.iter().map(|p| p.name.clone()));
    names.sort();

    println!("\nProviders ({}):", names.len());
    for name in &names {
        let enabled = config
            .ingestion
            .providers
            .get(name)
            .map_or(true, |entry| entry.enabled);
        let plan = QueryPlan::for_provider(name, &config.ingestion);
        let cap = plan
            .max_results_per_query
            .map_or_else(|| "unbounded".to_string(), |cap| cap.to_string());

        println!(
            "  - {}{} ({} queries, cap {}, delay {:?})",
            name,
            if enabled { "" } else { " [disabled]" },
            plan.queries.len(),
            cap,
            plan.query_delay
        );
        for query in &plan.queries {
            println!("    * {:?}", query);
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would run selector: {}", selector);
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    use pricetide::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))
        .context("failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main ingestion job
async fn handle_ingest(config: Config, config_hash: String, selector: ProviderSelector) -> Result<()> {
    let storage = Arc::new(Mutex::new(
        open_storage(Path::new(&config.storage.database_path))
            .context("failed to open database")?,
    ));

    let robots = RobotsChecker::from_config(&config.fetch)
        .context("failed to build robots.txt client")?
        .with_persistent_cache(Arc::new(SqliteCache::new(storage.clone())));
    let limiter = RateLimiterManager::from_config(&config.rate_limits);
    let fetch = FetchClient::new(
        config.fetch.clone(),
        Arc::new(limiter),
        Arc::new(robots),
        Arc::new(TracingAuditSink),
    )
    .context("failed to build fetch client")?;

    let registry = build_registry(&config, Arc::new(fetch))?;
    tracing::info!("Registered providers: {}", registry.names().join(", "));

    if !config.fetch.allow_live_fetch {
        tracing::info!("Live fetch is disabled; external hosts will be blocked");
    }

    let coordinator = Coordinator::new(
        Arc::new(registry),
        storage,
        PricingNormalizer::new(config.pricing.clone()),
        config.ingestion.clone(),
        config_hash,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            on_signal.cancel();
        }
    });

    let report = coordinator.run(&cancel, &selector).await?;

    println!(
        "Run {} {}: {} providers, {} candidates, {} products created, {} matched, {} offers written, {} errors",
        report.run_id,
        report.status.to_db_string(),
        report.providers_run,
        report.candidates,
        report.products_created,
        report.products_matched(),
        report.offers_written,
        report.errors()
    );

    Ok(())
}
