//! Dedup-insert of scraped stories into the record store

use crate::source::ContentSource;
use shorts_common::db::RecordStore;
use shorts_common::Result;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// How far back to look for stories
    pub window: Duration,
    /// Minimum formatted content length in characters
    pub min_content_length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub new_items: usize,
    pub duplicates: usize,
    pub skipped_short: usize,
    pub failed_communities: Vec<String>,
}

/// Fetch every community and store the stories not seen before
///
/// A community whose fetch fails is recorded in the summary and skipped.
/// Store errors are not recoverable here and abort the run.
pub async fn ingest(
    source: &dyn ContentSource,
    store: &dyn RecordStore,
    communities: &[String],
    options: &IngestOptions,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    info!(
        "Starting scrape: {} communities from {}, window {:?}",
        communities.len(),
        source.name(),
        options.window
    );

    for community in communities {
        let items = match source.fetch(community, options.window).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Error scraping {}: {}", community, e);
                summary.failed_communities.push(community.clone());
                continue;
            }
        };

        for item in items {
            if item.content.trim().is_empty() || item.content_len() < options.min_content_length {
                debug!("Skipped: {} - content shorter than {}", item.id, options.min_content_length);
                summary.skipped_short += 1;
                continue;
            }

            if store.insert_item_if_absent(&item).await? {
                summary.new_items += 1;
                info!("Stored new story: {} ({} chars)", item.id, item.content_len());
            } else {
                summary.duplicates += 1;
                debug!("Duplicate story skipped: {}", item.id);
            }
        }
    }

    info!(
        "Scraping complete: {} new stories, {} duplicates, {} too short, {} failed communities",
        summary.new_items,
        summary.duplicates,
        summary.skipped_short,
        summary.failed_communities.len()
    );

    Ok(summary)
}
