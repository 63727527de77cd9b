//! Batch planning
//!
//! Partitions unevaluated stories into scoring batches under two ceilings:
//! an estimated token budget and a maximum story count.
//!
//! Stories are first sorted by content length (stable, so ties keep their
//! input order) and then packed greedily. A story that alone exceeds the
//! token budget still gets a batch of its own; nothing is ever dropped.

use crate::prompt::format_story;
use shorts_common::Item;
use tracing::{debug, info};

/// Words per token used by [`estimate_tokens`]
const WORDS_PER_TOKEN: f64 = 0.75;

/// Per-batch ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerBudget {
    /// Estimated tokens allowed per batch, prompt wrapper included
    pub max_tokens: usize,
    /// Stories allowed per batch (0 is treated as 1)
    pub max_items: usize,
    /// Estimated tokens of the prompt wrapper, charged once per batch
    pub overhead_tokens: usize,
}

/// Rough token count: whitespace-separated words / 0.75, truncated
pub fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f64 / WORDS_PER_TOKEN) as usize
}

/// Token estimate of one story as rendered in a prompt
pub fn item_tokens(item: &Item) -> usize {
    estimate_tokens(&format_story(item))
}

/// Group stories into ordered, non-empty batches
pub fn plan_batches(mut items: Vec<Item>, budget: &PlannerBudget) -> Vec<Vec<Item>> {
    let max_items = budget.max_items.max(1);

    // sort_by_key is stable
    items.sort_by_key(Item::content_len);

    let mut batches: Vec<Vec<Item>> = Vec::new();
    let mut current: Vec<Item> = Vec::new();
    let mut current_tokens = 0usize;

    for item in items {
        let tokens = item_tokens(&item);
        let over_budget = current_tokens + tokens + budget.overhead_tokens > budget.max_tokens;
        let full = current.len() >= max_items;

        if !current.is_empty() && (over_budget || full) {
            debug!("Closing batch of {} stories (~{} tokens)", current.len(), current_tokens);
            batches.push(std::mem::take(&mut current));
            current_tokens = 0;
        }

        if current.is_empty() && tokens + budget.overhead_tokens > budget.max_tokens {
            debug!("Story {} (~{} tokens) exceeds the batch budget on its own", item.id, tokens);
        }

        current_tokens += tokens;
        current.push(item);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    info!("Created {} batches for processing", batches.len());
    batches
}
