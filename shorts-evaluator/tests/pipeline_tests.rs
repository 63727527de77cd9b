//! End-to-end evaluation runs against an in-memory store

use async_trait::async_trait;
use serde_json::{json, Value};
use shorts_common::config::EvaluatorConfig;
use shorts_common::db::{RecordStore, SqliteStore};
use shorts_common::{Category, Item};
use shorts_evaluator::{evaluate_pending, PromptBuilder, ScoringClient, ScoringError};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Answers every prompt by scoring the story ids it finds in it
///
/// Ids in `skip` are left out of the answer, `extra` ids are added to it,
/// and queued failures are returned before any answer is produced.
#[derive(Default)]
struct PromptEchoScorer {
    skip: HashSet<String>,
    extra: Vec<String>,
    failures: Mutex<VecDeque<ScoringError>>,
    calls: Mutex<usize>,
}

impl PromptEchoScorer {
    fn failing(times: usize) -> Self {
        let failures = (0..times)
            .map(|_| ScoringError::NetworkError("connection refused".to_string()))
            .collect();
        Self {
            failures: Mutex::new(failures),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ScoringClient for PromptEchoScorer {
    async fn score(&self, prompt: &str) -> Result<Value, ScoringError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let ids = prompt
            .lines()
            .filter_map(|line| line.strip_prefix("Story ID: "))
            .map(str::to_string)
            .filter(|id| !self.skip.contains(id))
            .chain(self.extra.iter().cloned());

        let evaluations: Vec<Value> = ids
            .map(|id| json!({"reddit_id": id, "score": 42, "category": "drama", "target_audience": "mature"}))
            .collect();

        Ok(json!({ "evaluations": evaluations }))
    }
}

async fn seeded_store(count: usize) -> SqliteStore {
    let store = SqliteStore::in_memory().await.unwrap();
    store.init_schema().await.unwrap();
    for n in 0..count {
        let item = Item::new(
            format!("story{:03}", n),
            "AmItheAsshole",
            "word ".repeat(20 + n),
            1_700_000_000 + n as i64,
            Some("Not the A-hole".to_string()),
        );
        store.insert_item_if_absent(&item).await.unwrap();
    }
    store
}

fn config(items_per_batch: usize) -> EvaluatorConfig {
    EvaluatorConfig {
        max_items_per_batch: items_per_batch,
        batch_delay_secs: 0,
        ..EvaluatorConfig::default()
    }
}

#[tokio::test]
async fn test_full_run_evaluates_everything() {
    let store = seeded_store(7).await;
    let scorer = PromptEchoScorer::default();

    let summary = evaluate_pending(&store, &scorer, &PromptBuilder::default(), &config(3), None)
        .await
        .unwrap();

    assert_eq!(summary.batches_planned, 3);
    assert_eq!(summary.batches_succeeded, 3);
    assert_eq!(summary.items_processed, 7);
    assert_eq!(summary.evaluations_stored, 7);
    assert!(!summary.halted);
    assert!(store.get_unevaluated_items(None).await.unwrap().is_empty());

    let stored = store.get_evaluation("story004").await.unwrap().unwrap();
    assert_eq!(stored.score, 42);
    assert_eq!(stored.category, Category::Drama);
}

#[tokio::test]
async fn test_skipped_stories_stay_pending_for_next_run() {
    let store = seeded_store(4).await;
    let scorer = PromptEchoScorer {
        skip: ["story001".to_string(), "story003".to_string()].into_iter().collect(),
        ..PromptEchoScorer::default()
    };

    let summary = evaluate_pending(&store, &scorer, &PromptBuilder::default(), &config(10), None)
        .await
        .unwrap();

    assert_eq!(summary.batches_succeeded, 1);
    assert_eq!(summary.evaluations_stored, 2);
    assert_eq!(summary.missing_coverage, 2);

    let pending: Vec<String> = store
        .get_unevaluated_items(None)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(pending, vec!["story003", "story001"]);
}

#[tokio::test]
async fn test_unexpected_ids_are_not_persisted() {
    let store = seeded_store(2).await;
    let scorer = PromptEchoScorer {
        extra: vec!["ghost99".to_string()],
        ..PromptEchoScorer::default()
    };

    let summary = evaluate_pending(&store, &scorer, &PromptBuilder::default(), &config(10), None)
        .await
        .unwrap();

    assert_eq!(summary.evaluations_stored, 2);
    assert!(store.get_evaluation("ghost99").await.unwrap().is_none());
    assert_eq!(store.count_evaluations().await.unwrap(), 2);
}

#[tokio::test]
async fn test_max_stories_limits_the_run() {
    let store = seeded_store(5).await;
    let scorer = PromptEchoScorer::default();

    let summary = evaluate_pending(&store, &scorer, &PromptBuilder::default(), &config(10), Some(2))
        .await
        .unwrap();

    assert_eq!(summary.items_processed, 2);
    // Most recent first
    assert!(store.get_evaluation("story004").await.unwrap().is_some());
    assert!(store.get_evaluation("story003").await.unwrap().is_some());
    assert_eq!(store.get_unevaluated_items(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_zero_max_stories_evaluates_everything() {
    let store = seeded_store(3).await;
    let scorer = PromptEchoScorer::default();

    let summary = evaluate_pending(&store, &scorer, &PromptBuilder::default(), &config(10), Some(0))
        .await
        .unwrap();

    assert_eq!(summary.items_processed, 3);
    assert!(store.get_unevaluated_items(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transport_failures_halt_run() {
    let store = seeded_store(5).await;
    let scorer = PromptEchoScorer::failing(10);

    let summary = evaluate_pending(&store, &scorer, &PromptBuilder::default(), &config(1), None)
        .await
        .unwrap();

    assert!(summary.halted);
    assert_eq!(summary.batches_attempted, 3);
    assert_eq!(summary.batches_failed, 3);
    assert_eq!(scorer.calls(), 3);
    assert_eq!(store.count_evaluations().await.unwrap(), 0);
}

#[tokio::test]
async fn test_recovery_after_transient_failures() {
    let store = seeded_store(4).await;
    let scorer = PromptEchoScorer::failing(2);

    let summary = evaluate_pending(&store, &scorer, &PromptBuilder::default(), &config(1), None)
        .await
        .unwrap();

    assert!(!summary.halted);
    assert_eq!(summary.batches_failed, 2);
    assert_eq!(summary.batches_succeeded, 2);
    assert_eq!(store.count_evaluations().await.unwrap(), 2);
}

#[tokio::test]
async fn test_nothing_pending_makes_no_calls() {
    let store = seeded_store(0).await;
    let scorer = PromptEchoScorer::default();

    let summary = evaluate_pending(&store, &scorer, &PromptBuilder::default(), &config(10), None)
        .await
        .unwrap();

    assert_eq!(summary.batches_planned, 0);
    assert_eq!(scorer.calls(), 0);
}
