//! shorts-scraper - Reddit story collector
//!
//! Scrapes text stories from the configured subreddits and stores the ones
//! not seen before. Evaluation is done separately by `shorts-evaluator`.

use anyhow::{bail, Result};
use clap::Parser;
use shorts_common::config::TomlConfig;
use shorts_common::db::open_store;
use shorts_common::logging::init_tracing;
use shorts_scraper::{ingest, IngestOptions, RedditClient};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Scrape Reddit stories and store them in the database
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of hours back to scrape from (defaults to scraper.hours)
    #[arg(long)]
    hours: Option<u32>,

    /// Path to config file (overrides SHORTS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) = TomlConfig::load(args.config.as_deref())?;
    config.apply_env_overrides()?;
    config.validate()?;

    init_tracing(&config.logging)?;
    info!("Starting shorts-scraper v{}", env!("CARGO_PKG_VERSION"));
    source.log();

    if config.scraper.subreddits.is_empty() {
        bail!("No subreddits specified in config (scraper.subreddits)");
    }

    let hours = args.hours.unwrap_or(config.scraper.hours);
    let options = IngestOptions {
        window: Duration::from_secs(u64::from(hours) * 3600),
        min_content_length: config.scraper.min_content_length,
    };

    let store = open_store(&config.database).await?;
    let client = RedditClient::new(&config.scraper)?;

    let result = ingest(&client, store.as_ref(), &config.scraper.subreddits, &options).await;
    store.close().await;

    let summary = result?;
    if !summary.failed_communities.is_empty() {
        warn!("Communities that failed: {}", summary.failed_communities.join(", "));
    }

    Ok(())
}
