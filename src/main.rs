//! Command-line interface for search-sync
//!
//! # Usage Examples
//!
//! ```bash
//! # Run the engine until interrupted
//! search-sync --config search-sync.yaml run
//!
//! # Check connectivity of every configured source
//! search-sync --config search-sync.yaml ping
//!
//! # Compare upstream rows against indexed documents for one mapping
//! search-sync --config search-sync.yaml check --mapping orders
//!
//! # Force a full resync of one mapping
//! search-sync --config search-sync.yaml refresh --mapping orders
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use checkpoint::FilesystemStore;
use clap::{Parser, Subcommand};
use sync_core::{MappingId, SourceId};
use tracing::info;

use search_sync::{
    admin, BuiltinConnectors, EngineConfig, EngineContext, JsonlStatsStore, LogStatsStore,
    Orchestrator, StatsStore,
};

#[derive(Parser)]
#[command(name = "search-sync")]
#[command(about = "Mirror database change events into search indexes")]
#[command(long_about = None)]
struct Cli {
    /// Path to the engine configuration file
    #[arg(
        long,
        default_value = "search-sync.yaml",
        env = "SEARCH_SYNC_CONFIG"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync engine until interrupted
    Run,

    /// Check connectivity of configured sources
    Ping {
        /// Only check this source
        #[arg(long)]
        source: Option<String>,
    },

    /// Compare upstream row count against indexed document count
    Check {
        /// Mapping to check
        #[arg(long)]
        mapping: String,
    },

    /// Force a full resync of one mapping
    Refresh {
        /// Mapping to refresh
        #[arg(long)]
        mapping: String,
    },
}

fn build_context(config: &EngineConfig) -> EngineContext {
    let checkpoints = Arc::new(FilesystemStore::new(&config.engine.checkpoint_dir));
    let stats: Arc<dyn StatsStore> = match &config.engine.stats_path {
        Some(path) => Arc::new(JsonlStatsStore::new(path)),
        None => Arc::new(LogStatsStore),
    };
    EngineContext::new(
        Arc::new(BuiltinConnectors::new()),
        checkpoints,
        stats,
        config.engine.clone(),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search_sync=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_file(&cli.config)?;
    let ctx = build_context(&config);

    match cli.command {
        Commands::Run => run(ctx, config).await,
        Commands::Ping { source } => ping(ctx, config, source).await,
        Commands::Check { mapping } => check(ctx, config, mapping).await,
        Commands::Refresh { mapping } => refresh(ctx, config, mapping).await,
    }
}

async fn run(ctx: EngineContext, config: EngineConfig) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(ctx);
    orchestrator.startup(config.plans()).await;
    info!("Sync engine started, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down");
    orchestrator.shutdown().await;
    Ok(())
}

async fn ping(
    ctx: EngineContext,
    config: EngineConfig,
    only: Option<String>,
) -> anyhow::Result<()> {
    let plans: Vec<_> = config
        .plans()
        .into_iter()
        .filter(|plan| match &only {
            Some(id) => plan.source.id == SourceId::new(id.clone()),
            None => true,
        })
        .collect();
    if plans.is_empty() {
        anyhow::bail!("no matching sources configured");
    }

    let mut failures = 0;
    for plan in &plans {
        match admin::ping(&ctx, plan).await {
            Ok(()) => println!("source '{}': ok", plan.source.id),
            Err(error) => {
                failures += 1;
                println!("source '{}': FAILED ({error:#})", plan.source.id);
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} source(s) unreachable");
    }
    Ok(())
}

async fn check(ctx: EngineContext, config: EngineConfig, mapping: String) -> anyhow::Result<()> {
    let mapping_id = MappingId::new(mapping);
    let (plan, _) = config
        .plan_for_mapping(&mapping_id)
        .with_context(|| format!("mapping '{mapping_id}' is not configured"))?;

    let report = admin::check(&ctx, &plan, &mapping_id).await?;
    println!(
        "table '{}': {} rows, index '{}': {} documents ({})",
        report.table,
        report.source_rows,
        report.index,
        report.index_documents,
        if report.in_sync() { "in sync" } else { "DRIFT" }
    );
    Ok(())
}

async fn refresh(ctx: EngineContext, config: EngineConfig, mapping: String) -> anyhow::Result<()> {
    let mapping_id = MappingId::new(mapping);
    let (plan, _) = config
        .plan_for_mapping(&mapping_id)
        .with_context(|| format!("mapping '{mapping_id}' is not configured"))?;

    let total = admin::refresh(&ctx, &plan, &mapping_id).await?;
    println!("refreshed {total} documents");
    Ok(())
}
