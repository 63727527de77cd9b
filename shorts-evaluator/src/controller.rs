//! Run controller
//!
//! Feeds batches to a [`BatchProcessor`] strictly one after another, waits a
//! fixed delay between batches and stops the run once too many batches in a
//! row have failed. Any success resets the failure streak.

use crate::processor::{BatchError, BatchReport};
use async_trait::async_trait;
use shorts_common::Item;
use std::time::Duration;
use tracing::{error, info};

/// Processes one batch; an `Err` marks the batch as failed
#[async_trait]
pub trait BatchProcessor: Send {
    async fn process(&mut self, batch: &[Item]) -> Result<BatchReport, BatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Pause between consecutive batches (not after the last one)
    pub batch_delay: Duration,
    /// Consecutive failed batches that halt the run
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches_planned: usize,
    pub batches_attempted: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
    /// Stories in successful batches
    pub items_processed: usize,
    /// Evaluation rows newly written
    pub evaluations_stored: u64,
    /// Stories in successful batches that got no valid evaluation
    pub missing_coverage: usize,
    /// True when the failure threshold stopped the run early
    pub halted: bool,
}

pub struct RunController {
    settings: RunSettings,
    consecutive_failures: u32,
}

impl RunController {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Process `batches` in order until done or the breaker trips
    pub async fn run<P>(&mut self, batches: &[Vec<Item>], processor: &mut P) -> RunSummary
    where
        P: BatchProcessor + ?Sized,
    {
        let threshold = self.settings.max_consecutive_failures.max(1);
        let mut summary = RunSummary {
            batches_planned: batches.len(),
            ..RunSummary::default()
        };

        for (index, batch) in batches.iter().enumerate() {
            let number = index + 1;
            info!("Processing batch {}/{} ({} stories)", number, batches.len(), batch.len());
            summary.batches_attempted += 1;

            match processor.process(batch).await {
                Ok(report) => {
                    self.consecutive_failures = 0;
                    summary.batches_succeeded += 1;
                    summary.items_processed += batch.len();
                    summary.evaluations_stored += report.inserted;
                    summary.missing_coverage += report.missing.len();
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    summary.batches_failed += 1;
                    error!(
                        "Batch {} failed (failure count: {}): {}",
                        number, self.consecutive_failures, e
                    );

                    if self.consecutive_failures >= threshold {
                        error!("Maximum consecutive failures ({}) reached. Stopping.", threshold);
                        summary.halted = true;
                        break;
                    }
                }
            }

            if number < batches.len() && !self.settings.batch_delay.is_zero() {
                info!("Waiting {:?} before next batch...", self.settings.batch_delay);
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        info!(
            "Evaluation complete. Processed {} stories in {}/{} successful batches ({} evaluations stored, {} without coverage){}",
            summary.items_processed,
            summary.batches_succeeded,
            summary.batches_attempted,
            summary.evaluations_stored,
            summary.missing_coverage,
            if summary.halted { " - halted early" } else { "" }
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScoringError;
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Replays a fixed sequence of outcomes and records what it was given
    struct ScriptedProcessor {
        outcomes: VecDeque<bool>,
        seen: Vec<String>,
    }

    impl ScriptedProcessor {
        fn new(outcomes: &[bool]) -> Self {
            Self {
                outcomes: outcomes.iter().copied().collect(),
                seen: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl BatchProcessor for ScriptedProcessor {
        async fn process(&mut self, batch: &[Item]) -> Result<BatchReport, BatchError> {
            self.seen.push(batch[0].id.clone());
            if self.outcomes.pop_front().unwrap_or(true) {
                Ok(BatchReport {
                    sent: batch.len(),
                    accepted: batch.len(),
                    inserted: batch.len() as u64,
                    rejected: 0,
                    missing: Vec::new(),
                })
            } else {
                Err(BatchError::Scoring(ScoringError::NetworkError("connection reset".to_string())))
            }
        }
    }

    fn batches(n: usize) -> Vec<Vec<Item>> {
        (0..n)
            .map(|i| vec![Item::new(format!("batch{}", i), "tifu", "story", 0, None)])
            .collect()
    }

    fn settings() -> RunSettings {
        RunSettings {
            batch_delay: Duration::ZERO,
            max_consecutive_failures: 3,
        }
    }

    #[tokio::test]
    async fn test_three_failures_halt_before_fourth_batch() {
        let mut processor = ScriptedProcessor::new(&[false, false, false, true]);
        let summary = RunController::new(settings()).run(&batches(4), &mut processor).await;

        assert!(summary.halted);
        assert_eq!(summary.batches_attempted, 3);
        assert_eq!(summary.batches_failed, 3);
        assert_eq!(processor.seen, vec!["batch0", "batch1", "batch2"]);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let mut processor = ScriptedProcessor::new(&[false, false, true, false, false, false]);
        let mut controller = RunController::new(settings());
        let summary = controller.run(&batches(6), &mut processor).await;

        assert!(summary.halted);
        assert_eq!(summary.batches_attempted, 6);
        assert_eq!(summary.batches_succeeded, 1);
        assert_eq!(summary.items_processed, 1);
        assert_eq!(controller.consecutive_failures(), 3);
    }

    #[tokio::test]
    async fn test_halts_mid_run_and_abandons_rest() {
        let mut processor = ScriptedProcessor::new(&[true, false, false, false, true, true]);
        let summary = RunController::new(settings()).run(&batches(6), &mut processor).await;

        assert!(summary.halted);
        assert_eq!(summary.batches_attempted, 4);
        assert_eq!(processor.seen.len(), 4);
    }

    #[tokio::test]
    async fn test_all_success_processes_everything() {
        let mut processor = ScriptedProcessor::new(&[true, false, true, false, true]);
        let summary = RunController::new(settings()).run(&batches(5), &mut processor).await;

        assert!(!summary.halted);
        assert_eq!(summary.batches_attempted, 5);
        assert_eq!(summary.batches_succeeded, 3);
        assert_eq!(summary.batches_failed, 2);
        assert_eq!(summary.evaluations_stored, 3);
    }

    #[tokio::test]
    async fn test_delay_applied_between_batches() {
        let mut processor = ScriptedProcessor::new(&[true, true, true]);
        let mut controller = RunController::new(RunSettings {
            batch_delay: Duration::from_millis(50),
            max_consecutive_failures: 3,
        });

        let start = Instant::now();
        controller.run(&batches(3), &mut processor).await;

        // Two gaps for three batches
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_no_delay_after_last_batch() {
        let mut processor = ScriptedProcessor::new(&[true]);
        let mut controller = RunController::new(RunSettings {
            batch_delay: Duration::from_secs(30),
            max_consecutive_failures: 3,
        });

        let one = batches(1);
        let run = controller.run(&one, &mut processor);
        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run slept after its only batch");
        assert_eq!(summary.batches_succeeded, 1);
    }

    #[tokio::test]
    async fn test_empty_run() {
        let mut processor = ScriptedProcessor::new(&[]);
        let summary = RunController::new(settings()).run(&[], &mut processor).await;
        assert_eq!(summary, RunSummary::default());
    }
}
