//! shorts-evaluator library interface
//!
//! Scores stored stories for short-video potential:
//! planner → prompt → scoring client → validator → record store,
//! driven batch by batch by the run controller.

pub mod client;
pub mod controller;
pub mod planner;
pub mod processor;
pub mod prompt;
pub mod validator;

pub use client::{GeminiClient, ScoringClient, ScoringError};
pub use controller::{BatchProcessor, RunController, RunSettings, RunSummary};
pub use planner::{plan_batches, PlannerBudget};
pub use processor::{BatchError, BatchEvaluator, BatchReport};
pub use prompt::PromptBuilder;

use shorts_common::config::EvaluatorConfig;
use shorts_common::db::RecordStore;
use tracing::info;

/// Planner budget from configuration, charging the prompt wrapper per batch
pub fn planner_budget(config: &EvaluatorConfig, prompts: &PromptBuilder) -> PlannerBudget {
    PlannerBudget {
        max_tokens: config.max_tokens_per_batch,
        max_items: config.max_items_per_batch,
        overhead_tokens: prompts.base_tokens(),
    }
}

pub fn run_settings(config: &EvaluatorConfig) -> RunSettings {
    RunSettings {
        batch_delay: config.batch_delay(),
        max_consecutive_failures: config.max_consecutive_failures,
    }
}

/// Evaluate up to `limit` unevaluated stories, most recent first
pub async fn evaluate_pending(
    store: &dyn RecordStore,
    scorer: &dyn ScoringClient,
    prompts: &PromptBuilder,
    config: &EvaluatorConfig,
    limit: Option<u32>,
) -> shorts_common::Result<RunSummary> {
    let items = store.get_unevaluated_items(limit).await?;
    if items.is_empty() {
        info!("No stories to evaluate");
        return Ok(RunSummary::default());
    }

    let batches = plan_batches(items, &planner_budget(config, prompts));
    let mut evaluator = BatchEvaluator::new(scorer, store, prompts);
    let mut controller = RunController::new(run_settings(config));

    Ok(controller.run(&batches, &mut evaluator).await)
}
