use clap::Parser;
use empty_leg_etl::config::sources::SourcesConfig;
use empty_leg_etl::core::orchestrator::{Orchestrator, RunOptions, SourceOutcome};
use empty_leg_etl::store::{cooldown::JsonStateStore, postgres::PgLegStore};
use empty_leg_etl::utils::{logger, validation::Validate};
use empty_leg_etl::{AirportResolver, CliConfig, DepartFallback, FallbackPolicy, LegStore, ScrapeOptions};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting empty-leg-etl");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(2);
    }

    let overrides = match &config.sources_config {
        Some(path) => match SourcesConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("❌ sources config {} failed to load: {}", path.display(), e);
                eprintln!("❌ {}", e);
                std::process::exit(2);
            }
        },
        None => SourcesConfig::default(),
    };

    let resolver = Arc::new(AirportResolver::load_or_empty(&config.airports_index));

    let keys = overrides.filter_enabled(config.sources.clone());
    let sources = match empty_leg_etl::sources::build_sources(&keys, resolver.clone(), &overrides) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("❌ {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(2);
        }
    };

    let state = JsonStateStore::new(config.tmp_dir.join("sources-disabled.json"));

    // Config validation already proved this parses.
    let depart = config
        .depart_fallback
        .parse::<DepartFallback>()
        .unwrap_or(DepartFallback::Now);
    let policy = FallbackPolicy {
        depart,
        seats: config.seats_fallback,
    };

    let store: Option<PgLegStore> = if config.dry_run {
        tracing::info!("🔄 dry run: no database writes");
        None
    } else {
        // Validation guarantees the url is present here.
        let url = config.database_url.clone().unwrap_or_default();
        match PgLegStore::connect(&url).await {
            Ok(store) => {
                if let Err(e) = store.ensure_schema().await {
                    tracing::error!("❌ schema setup failed: {}", e);
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
                Some(store)
            }
            Err(e) => {
                tracing::error!("❌ database unreachable after retries: {}", e);
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        }
    };

    let opts = RunOptions {
        force: config.force.clone(),
        cooldown: chrono::Duration::minutes(config.cooldown_minutes),
        scrape: ScrapeOptions {
            dump_artifacts: config.dump_artifacts,
            tmp_dir: config.tmp_dir.clone(),
        },
    };

    let orchestrator = Orchestrator::new(&sources, &resolver, &state, policy);
    let summary = orchestrator
        .run(store.as_ref().map(|s| s as &dyn LegStore), &opts)
        .await;

    for source in &summary.sources {
        match &source.outcome {
            SourceOutcome::Scraped { raw, kept } => {
                println!("📡 {}: {} candidates, {} kept", source.key, raw, kept)
            }
            SourceOutcome::SkippedCooldown { until } => {
                println!("⏸️  {}: on cooldown until {}", source.key, until)
            }
            SourceOutcome::Failed { reason } => println!("❌ {}: {}", source.key, reason),
        }
    }
    println!(
        "💾 {} added, {} updated, {} skipped, {} row errors, {} rejected",
        summary.save.added,
        summary.save.updated,
        summary.save.skipped,
        summary.save.errors.len(),
        summary.rejected
    );

    if summary.total_failure() {
        tracing::error!("❌ every attempted source failed");
        eprintln!("❌ every attempted source failed");
        std::process::exit(1);
    }

    tracing::info!("✅ ingestion run complete");
    Ok(())
}
