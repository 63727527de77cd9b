//! shorts-evaluator - story scoring
//!
//! Scores unevaluated stories with the configured Gemini model and stores
//! the results. Run `shorts-scraper` first to collect stories.

use anyhow::{anyhow, Result};
use clap::Parser;
use shorts_common::config::TomlConfig;
use shorts_common::db::{open_store, RecordStore};
use shorts_common::logging::init_tracing;
use shorts_evaluator::planner::item_tokens;
use shorts_evaluator::{evaluate_pending, plan_batches, planner_budget, GeminiClient, PromptBuilder};
use std::path::PathBuf;
use tracing::{info, warn};

/// Evaluate stored stories for short-video potential
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Maximum number of stories to evaluate, most recent first (0 means no limit)
    #[arg(long)]
    max_stories: Option<u32>,

    /// Path to config file (overrides SHORTS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plan batches and log them without calling the model
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) = TomlConfig::load(args.config.as_deref())?;
    config.apply_env_overrides()?;
    config.validate()?;

    init_tracing(&config.logging)?;
    info!(
        "Starting shorts-evaluator v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    source.log();

    let prompts = PromptBuilder::default();
    let store = open_store(&config.database).await?;

    let result = if args.dry_run {
        dry_run(store.as_ref(), &prompts, &config, args.max_stories).await
    } else {
        evaluate(store.as_ref(), &prompts, &config, args.max_stories).await
    };

    store.close().await;
    result
}

async fn evaluate(
    store: &dyn RecordStore,
    prompts: &PromptBuilder,
    config: &TomlConfig,
    limit: Option<u32>,
) -> Result<()> {
    let api_key = config
        .evaluator
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("No API key configured (set GEMINI_API_KEY or evaluator.api_key)"))?;
    let client = GeminiClient::new(&config.evaluator, api_key)
        .map_err(|e| anyhow!("Failed to create scoring client: {}", e))?;

    let summary = evaluate_pending(store, &client, prompts, &config.evaluator, limit).await?;
    if summary.halted {
        warn!(
            "Run halted after {} consecutive failed batches",
            config.evaluator.max_consecutive_failures
        );
    }

    Ok(())
}

/// Log the batch plan for the pending stories without scoring them
async fn dry_run(
    store: &dyn RecordStore,
    prompts: &PromptBuilder,
    config: &TomlConfig,
    limit: Option<u32>,
) -> Result<()> {
    let items = store.get_unevaluated_items(limit).await?;
    info!("Dry run: {} stories pending evaluation", items.len());

    let batches = plan_batches(items, &planner_budget(&config.evaluator, prompts));
    for (index, batch) in batches.iter().enumerate() {
        let tokens: usize = batch.iter().map(item_tokens).sum();
        info!(
            "Batch {}/{}: {} stories, ~{} tokens (+{} prompt)",
            index + 1,
            batches.len(),
            batch.len(),
            tokens,
            prompts.base_tokens()
        );
    }

    Ok(())
}
