/*!
 * Tests for the parallel batch scheduler
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;

use modtrans::config::{OrchestratorConfig, RetryConfig, SchedulerConfig};
use modtrans::domain::{BatchPhase, TranslationContext, TranslationUnit};
use modtrans::errors::LlmError;
use modtrans::orchestrator::ParallelBatchHandler;
use modtrans::services::DomainEvent;

use crate::common::mock_services::MockLlm;
use crate::common::{build_harness_with, french_context, unit};

fn batches(count: usize) -> Vec<(Vec<TranslationUnit>, TranslationContext)> {
    (0..count)
        .map(|i| {
            (
                vec![unit(&format!("b{}u1", i), &format!("Batch text {}", i))],
                french_context(),
            )
        })
        .collect()
}

/// Collect terminal phases per batch id from a merged stream
async fn collect_terminals(
    stream: impl futures::Stream<Item = Result<modtrans::TranslationProgress, modtrans::OrchestrationError>> + Send,
) -> HashMap<String, BatchPhase> {
    let mut terminals = HashMap::new();

    futures::pin_mut!(stream);
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_secs(30), stream.next()).await {
        if let Ok(progress) = item {
            if progress.current_phase.is_terminal() {
                terminals.insert(progress.batch_id.clone(), progress.current_phase);
            }
        }
    }

    terminals
}

#[tokio::test]
async fn test_translateBatches_allComplete_withOneTerminalEach() {
    let harness = build_harness_with(OrchestratorConfig::default(), Arc::new(MockLlm::new()));
    let handler = ParallelBatchHandler::new(
        harness.orchestrator.clone(),
        &SchedulerConfig { max_concurrent_batches: 3 },
    );

    let stream = handler.translate_batches(batches(5));
    let terminals = collect_terminals(stream).await;

    assert_eq!(terminals.len(), 5, "one terminal event per batch");
    assert!(terminals.values().all(|p| *p == BatchPhase::Completed));
    assert_eq!(harness.llm.call_count(), 5);
}

#[tokio::test]
async fn test_translateBatches_shouldRespectConcurrencyLimit() {
    let llm = Arc::new(MockLlm::with_delay(Duration::from_millis(100)));
    let harness = build_harness_with(OrchestratorConfig::default(), llm);
    let handler = ParallelBatchHandler::new(
        harness.orchestrator.clone(),
        &SchedulerConfig { max_concurrent_batches: 2 },
    );

    let start = Instant::now();
    let stream = handler.translate_batches(batches(4));
    let terminals = collect_terminals(stream).await;
    let elapsed = start.elapsed();

    assert_eq!(terminals.len(), 4);
    // Four 100 ms batches through two slots need at least two waves.
    assert!(
        elapsed >= Duration::from_millis(180),
        "4 batches with 2 slots finished too fast: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_failedBatch_shouldNotAbortSiblings() {
    let mut config = OrchestratorConfig::default();
    config.retry = RetryConfig {
        max_retries: 0,
        backoff_base_ms: 1,
    };
    let harness = build_harness_with(config, Arc::new(MockLlm::new()));
    harness
        .llm
        .poison_text("Poisoned text", LlmError::Network("provider down".into()));

    let handler = ParallelBatchHandler::new(
        harness.orchestrator.clone(),
        &SchedulerConfig { max_concurrent_batches: 2 },
    );

    let mut all = batches(2);
    all.push((vec![unit("poison", "Poisoned text")], french_context()));

    let stream = handler.translate_batches(all);
    let terminals = collect_terminals(stream).await;

    assert_eq!(terminals.len(), 3);
    let completed = terminals
        .values()
        .filter(|p| **p == BatchPhase::Completed)
        .count();
    let failed = terminals
        .values()
        .filter(|p| **p == BatchPhase::Failed)
        .count();
    assert_eq!(completed, 2, "sibling batches must complete");
    assert_eq!(failed, 1, "the poisoned batch must fail alone");
}

#[tokio::test]
async fn test_droppedMergedStream_shouldCancelActiveBatches() {
    let llm = Arc::new(MockLlm::with_delay(Duration::from_millis(50)));
    let harness = build_harness_with(OrchestratorConfig::default(), llm);
    let handler = ParallelBatchHandler::new(
        harness.orchestrator.clone(),
        &SchedulerConfig { max_concurrent_batches: 1 },
    );

    let many: Vec<_> = (0..4)
        .map(|i| {
            (
                (0..10)
                    .map(|j| unit(&format!("d{}u{}", i, j), &format!("Slow text {} {}", i, j)))
                    .collect::<Vec<_>>(),
                french_context(),
            )
        })
        .collect();

    {
        let stream = handler.translate_batches(many);
        futures::pin_mut!(stream);
        // Take one event, then walk away.
        let _ = tokio::time::timeout(Duration::from_secs(5), stream.next()).await;
    }

    // The active batch observes cancellation at its next checkpoint.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if harness
            .events
            .saw(|e| matches!(e, DomainEvent::BatchCancelled { .. }))
        {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "no batch observed cancellation after the merged stream was dropped"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
