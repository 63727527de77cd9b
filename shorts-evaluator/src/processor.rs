//! Per-batch processing: prompt, score, reconcile, persist
//!
//! Every failure inside a batch is returned as a [`BatchError`] so the run
//! controller can count it; nothing here panics or aborts the run.

use crate::client::{ScoringClient, ScoringError};
use crate::controller::BatchProcessor;
use crate::prompt::PromptBuilder;
use crate::validator::{candidate_records, reconcile, ShapeError};
use async_trait::async_trait;
use shorts_common::db::RecordStore;
use shorts_common::Item;
use thiserror::Error;
use tracing::info;

/// Why a batch produced no stored evaluations
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("scoring call failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error("invalid response: {0}")]
    Shape(#[from] ShapeError),

    #[error("no valid evaluations among {received} records for {sent} stories")]
    NoValidEvaluations { sent: usize, received: usize },

    #[error("failed to store evaluations: {0}")]
    Persistence(#[from] shorts_common::Error),
}

/// What a successful batch achieved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: usize,
    /// Valid evaluations handed to the store
    pub accepted: usize,
    /// Rows the store newly inserted (already-stored ids are ignored)
    pub inserted: u64,
    pub rejected: usize,
    /// Sent ids without a valid evaluation
    pub missing: Vec<String>,
}

/// Scores batches against a live scoring client and record store
pub struct BatchEvaluator<'a> {
    scorer: &'a dyn ScoringClient,
    store: &'a dyn RecordStore,
    prompts: &'a PromptBuilder,
}

impl<'a> BatchEvaluator<'a> {
    pub fn new(scorer: &'a dyn ScoringClient, store: &'a dyn RecordStore, prompts: &'a PromptBuilder) -> Self {
        Self {
            scorer,
            store,
            prompts,
        }
    }
}

#[async_trait]
impl BatchProcessor for BatchEvaluator<'_> {
    async fn process(&mut self, batch: &[Item]) -> Result<BatchReport, BatchError> {
        let prompt = self.prompts.build(batch);
        let response = self.scorer.score(&prompt).await?;

        let received = candidate_records(&response)?.len();
        let reconciliation = reconcile(&response, batch)?;

        if reconciliation.accepted.is_empty() {
            return Err(BatchError::NoValidEvaluations {
                sent: batch.len(),
                received,
            });
        }

        let inserted = self.store.merge_evaluations(&reconciliation.accepted).await?;
        info!(
            "Successfully inserted {} evaluations ({} accepted, {} rejected, {} missing)",
            inserted,
            reconciliation.accepted.len(),
            reconciliation.rejected.len(),
            reconciliation.missing.len()
        );

        Ok(BatchReport {
            sent: batch.len(),
            accepted: reconciliation.accepted.len(),
            inserted,
            rejected: reconciliation.rejected.len(),
            missing: reconciliation.missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use shorts_common::db::SqliteStore;

    struct FixedScorer(Value);

    #[async_trait]
    impl ScoringClient for FixedScorer {
        async fn score(&self, _prompt: &str) -> Result<Value, ScoringError> {
            Ok(self.0.clone())
        }
    }

    struct DownScorer;

    #[async_trait]
    impl ScoringClient for DownScorer {
        async fn score(&self, _prompt: &str) -> Result<Value, ScoringError> {
            Err(ScoringError::ApiError(503, "overloaded".to_string()))
        }
    }

    async fn store_with(items: &[Item]) -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.init_schema().await.unwrap();
        for item in items {
            store.insert_item_if_absent(item).await.unwrap();
        }
        store
    }

    fn items() -> Vec<Item> {
        ["abc123", "def456", "ghi789"]
            .iter()
            .map(|id| Item::new(*id, "tifu", "a story", 1_700_000_000, None))
            .collect()
    }

    fn record(id: &str, score: i64) -> Value {
        json!({"reddit_id": id, "score": score, "category": "humor", "target_audience": "general"})
    }

    #[tokio::test]
    async fn test_partial_coverage_is_success() {
        let batch = items();
        let store = store_with(&batch).await;
        let scorer = FixedScorer(json!({"evaluations": [record("abc123", 80), record("ghi789", 15)]}));
        let prompts = PromptBuilder::default();

        let report = BatchEvaluator::new(&scorer, &store, &prompts)
            .process(&batch)
            .await
            .unwrap();

        assert_eq!(report.sent, 3);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.missing, vec!["def456".to_string()]);
        assert_eq!(store.count_evaluations().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_all_records_invalid_fails_batch() {
        let batch = items();
        let store = store_with(&batch).await;
        let scorer = FixedScorer(json!([record("abc123", 101), record("zzz999", 50)]));
        let prompts = PromptBuilder::default();

        let result = BatchEvaluator::new(&scorer, &store, &prompts).process(&batch).await;

        assert!(matches!(
            result,
            Err(BatchError::NoValidEvaluations { sent: 3, received: 2 })
        ));
        assert_eq!(store.count_evaluations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bad_shape_fails_batch() {
        let batch = items();
        let store = store_with(&batch).await;
        let scorer = FixedScorer(json!({"results": []}));
        let prompts = PromptBuilder::default();

        let result = BatchEvaluator::new(&scorer, &store, &prompts).process(&batch).await;
        assert!(matches!(result, Err(BatchError::Shape(_))));
    }

    #[tokio::test]
    async fn test_scoring_error_fails_batch() {
        let batch = items();
        let store = store_with(&batch).await;
        let prompts = PromptBuilder::default();

        let result = BatchEvaluator::new(&DownScorer, &store, &prompts).process(&batch).await;
        assert!(matches!(result, Err(BatchError::Scoring(ScoringError::ApiError(503, _)))));
    }

    #[tokio::test]
    async fn test_rejected_merge_fails_batch() {
        // Stories never inserted, so the foreign key rejects the evaluation rows
        let batch = items();
        let store = store_with(&[]).await;
        let scorer = FixedScorer(json!([record("abc123", 60)]));
        let prompts = PromptBuilder::default();

        let result = BatchEvaluator::new(&scorer, &store, &prompts).process(&batch).await;

        assert!(matches!(result, Err(BatchError::Persistence(_))));
        assert_eq!(store.count_evaluations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_already_stored_evaluations_still_succeed() {
        let batch = items();
        let store = store_with(&batch).await;
        let scorer = FixedScorer(json!([record("abc123", 70)]));
        let prompts = PromptBuilder::default();
        let mut evaluator = BatchEvaluator::new(&scorer, &store, &prompts);

        evaluator.process(&batch).await.unwrap();
        let report = evaluator.process(&batch).await.unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.inserted, 0);
        assert_eq!(store.count_evaluations().await.unwrap(), 1);
    }
}
