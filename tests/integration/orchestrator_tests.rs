/*!
 * End-to-end batch pipeline scenarios over mock services
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;

use modtrans::config::{OrchestratorConfig, RetryConfig};
use modtrans::domain::{BatchPhase, TranslationProgress, TranslationSource, VersionStatus};
use modtrans::errors::{LlmError, OrchestrationError};
use modtrans::services::{DomainEvent, TranslationMemoryService, TranslationVersionRepository};

use crate::common::mock_services::{MockLlm, MockStep, assert_no_llm_calls, echo_translation};
use crate::common::{build_harness, build_harness_with, french_context, unit};

/// Collect every stream item until it ends, splitting progress from a
/// terminal error.
async fn drain<S>(stream: S) -> (Vec<TranslationProgress>, Option<OrchestrationError>)
where
    S: futures::Stream<Item = Result<TranslationProgress, OrchestrationError>> + Send,
{
    let mut events = Vec::new();
    let mut error = None;

    futures::pin_mut!(stream);
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_secs(30), stream.next()).await {
        match item {
            Ok(progress) => events.push(progress),
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    (events, error)
}

fn fast_retry_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.retry = RetryConfig {
        max_retries: 3,
        backoff_base_ms: 1,
    };
    config
}

#[tokio::test]
async fn test_tmExactHits_shouldBypassLlm() {
    let harness = build_harness();

    // Seed the TM with exact pairs for all three units.
    for (source, target) in [
        ("Hello", "Bonjour"),
        ("Goodbye", "Au revoir"),
        ("Thanks", "Merci"),
    ] {
        harness
            .store
            .add_translation(source, target, "fr", None, 1.0)
            .await
            .unwrap();
    }

    let units = vec![unit("u1", "Hello"), unit("u2", "Goodbye"), unit("u3", "Thanks")];
    let (_, stream) = harness.orchestrator.clone().translate_batch(units, french_context());
    let (events, error) = drain(stream).await;

    assert!(error.is_none());
    let terminal = events.last().expect("no events");
    assert_eq!(terminal.current_phase, BatchPhase::Completed);
    assert_eq!(terminal.skipped_units, 3);
    assert_eq!(terminal.failed_units, 0);
    assert!((terminal.tm_reuse_rate - 1.0).abs() < 1e-9);
    assert_no_llm_calls(&harness.llm);

    for unit_id in ["u1", "u2", "u3"] {
        let version = harness
            .store
            .get_by_unit_and_project_language(unit_id, "pl-fr")
            .await
            .unwrap()
            .expect("version missing");
        assert_eq!(version.translation_source, TranslationSource::TmExact);
        assert_eq!(version.confidence_score, Some(1.0));
        assert_eq!(version.status, VersionStatus::Translated);
    }
}

#[tokio::test]
async fn test_crossBatchDedup_shouldInvokeLlmOnce() {
    // The delay keeps the first batch's LLM call in flight while the
    // second batch probes the cache, and keeps the TM empty until both
    // batches are past their TM phase.
    let llm = Arc::new(MockLlm::with_delay(Duration::from_millis(200)));
    let harness = build_harness_with(OrchestratorConfig::default(), llm);

    let (_, stream_a) = harness
        .orchestrator
        .clone()
        .translate_batch(vec![unit("a1", "Hello")], french_context());
    let (_, stream_b) = harness
        .orchestrator
        .clone()
        .translate_batch(vec![unit("b1", "Hello")], french_context());

    let ((events_a, error_a), (events_b, error_b)) =
        tokio::join!(drain(stream_a), drain(stream_b));

    assert!(error_a.is_none());
    assert!(error_b.is_none());
    assert_eq!(
        harness.llm.calls_containing("Hello"),
        1,
        "the LLM must be invoked at most once for a shared (source, language) pair"
    );

    for events in [&events_a, &events_b] {
        let terminal = events.last().expect("no events");
        assert_eq!(terminal.current_phase, BatchPhase::Completed);
        assert_eq!(terminal.successful_units, 1);
    }

    let expected = echo_translation("fr", "Hello");
    for unit_id in ["a1", "b1"] {
        let version = harness
            .store
            .get_by_unit_and_project_language(unit_id, "pl-fr")
            .await
            .unwrap()
            .expect("version missing");
        assert_eq!(version.translated_text.as_deref(), Some(expected.as_str()));
    }
}

#[tokio::test]
async fn test_tokenLimitError_shouldSplitAndComplete() {
    let harness = build_harness_with(fast_retry_config(), Arc::new(MockLlm::new()));
    harness
        .llm
        .push_steps([MockStep::Fail(LlmError::TokenLimit("request too large".into()))]);

    let units = vec![unit("u1", "First text"), unit("u2", "Second text")];
    let (_, stream) = harness.orchestrator.clone().translate_batch(units, french_context());
    let (events, error) = drain(stream).await;

    assert!(error.is_none());
    let terminal = events.last().expect("no events");
    assert_eq!(terminal.current_phase, BatchPhase::Completed);
    assert_eq!(terminal.successful_units, 2);

    // One failed call plus one per half.
    assert_eq!(harness.llm.call_count(), 3);
    assert!(
        terminal
            .llm_logs
            .iter()
            .any(|l| l.error_message.as_deref().is_some_and(|m| m.contains("Splitting"))),
        "logs must note the split: {:?}",
        terminal.llm_logs
    );
}

#[tokio::test]
async fn test_singleUnitContentFilter_shouldFailUnitAndComplete() {
    let harness = build_harness_with(fast_retry_config(), Arc::new(MockLlm::new()));
    harness
        .llm
        .push_steps([MockStep::Fail(LlmError::ContentFiltered("policy".into()))]);

    let (_, stream) = harness
        .orchestrator
        .clone()
        .translate_batch(vec![unit("u1", "Something spicy")], french_context());
    let (events, error) = drain(stream).await;

    assert!(error.is_none());
    let terminal = events.last().expect("no events");
    assert_eq!(terminal.current_phase, BatchPhase::Completed);
    assert_eq!(terminal.successful_units, 0);
    assert_eq!(terminal.failed_units, 1);
    assert!(
        terminal
            .llm_logs
            .iter()
            .any(|l| l.error_message.as_deref().is_some_and(|m| m.contains("loc_key_u1"))),
        "error log must mention the unit key: {:?}",
        terminal.llm_logs
    );
}

#[tokio::test]
async fn test_pauseAndResume_shouldGateProgressAndComplete() {
    let llm = Arc::new(MockLlm::with_delay(Duration::from_millis(20)));
    let harness = build_harness_with(OrchestratorConfig::default(), llm);

    let mut context = french_context();
    context.units_per_batch = 2;

    let units: Vec<_> = (0..100)
        .map(|i| unit(&format!("u{}", i), &format!("Line number {}", i)))
        .collect();
    let (batch_id, stream) = harness.orchestrator.clone().translate_batch(units, context);
    futures::pin_mut!(stream);

    // Wait for the first progress event, then pause.
    let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("no first event")
        .expect("stream ended early")
        .expect("unexpected error");
    assert!(!first.current_phase.is_terminal());

    harness.orchestrator.progress().pause(&batch_id).unwrap();
    assert!(harness.events.saw(|e| matches!(e, DomainEvent::BatchPaused { batch_id: id } if *id == batch_id)));

    // Drain events from work that was already in flight.
    loop {
        match tokio::time::timeout(Duration::from_millis(100), stream.next()).await {
            Ok(Some(Ok(p))) => assert!(!p.current_phase.is_terminal()),
            Ok(_) => panic!("stream ended while paused"),
            Err(_) => break,
        }
    }

    // Fully paused now: no events may arrive.
    assert!(
        tokio::time::timeout(Duration::from_millis(150), stream.next())
            .await
            .is_err(),
        "no progress events may be emitted during the paused interval"
    );

    harness.orchestrator.progress().resume(&batch_id).unwrap();
    assert!(harness.events.saw(|e| matches!(e, DomainEvent::BatchResumed { batch_id: id } if *id == batch_id)));

    let (events, error) = drain(stream).await;
    assert!(error.is_none());
    let terminal = events.last().expect("no events after resume");
    assert_eq!(terminal.current_phase, BatchPhase::Completed);
    assert_eq!(
        terminal.successful_units + terminal.failed_units + terminal.skipped_units,
        100
    );
}

#[tokio::test]
async fn test_rateLimitWithRetryAfter_shouldDelayAndComplete() {
    let harness = build_harness();
    harness.llm.push_steps([MockStep::Fail(LlmError::RateLimit {
        message: "slow down".into(),
        retry_after_secs: Some(1),
    })]);

    let start = Instant::now();
    let (_, stream) = harness
        .orchestrator
        .clone()
        .translate_batch(vec![unit("u1", "Hello")], french_context());
    let (events, error) = drain(stream).await;
    let elapsed = start.elapsed();

    assert!(error.is_none());
    assert_eq!(events.last().unwrap().current_phase, BatchPhase::Completed);
    assert_eq!(harness.llm.call_count(), 2);
    assert!(elapsed >= Duration::from_secs(1), "retry-after hint must be honored");
    assert!(elapsed < Duration::from_secs(2), "delay must use the hint, not full backoff");
}

#[tokio::test]
async fn test_cancel_shouldEmitSingleTerminalCancelledEvent() {
    let llm = Arc::new(MockLlm::with_delay(Duration::from_millis(20)));
    let harness = build_harness_with(OrchestratorConfig::default(), llm);

    let mut context = french_context();
    context.units_per_batch = 2;
    let units: Vec<_> = (0..50)
        .map(|i| unit(&format!("u{}", i), &format!("Line {}", i)))
        .collect();

    let (batch_id, stream) = harness.orchestrator.clone().translate_batch(units, context);
    futures::pin_mut!(stream);

    // Let it get going and drain the startup events so only
    // post-cancellation emissions are counted below.
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.next()).await;
    while let Ok(item) = tokio::time::timeout(Duration::from_millis(100), stream.next()).await {
        if item.is_none() {
            break;
        }
    }
    harness.orchestrator.progress().cancel(&batch_id);

    let mut terminal_events = 0;
    let mut last_phase = None;
    let mut post_cancel_nonterminal = 0;
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_secs(5), stream.next()).await {
        let progress = item.expect("cancellation must not surface as an error");
        if progress.current_phase.is_terminal() {
            terminal_events += 1;
        } else {
            post_cancel_nonterminal += 1;
        }
        last_phase = Some(progress.current_phase);
    }

    assert_eq!(last_phase, Some(BatchPhase::Cancelled));
    assert_eq!(terminal_events, 1, "exactly one terminal event");
    assert!(
        post_cancel_nonterminal <= 1,
        "at most one further non-terminal event after cancel, saw {}",
        post_cancel_nonterminal
    );
    assert!(harness.events.saw(|e| matches!(e, DomainEvent::BatchCancelled { .. })));
}

#[tokio::test]
async fn test_placeholderOnlyUnits_shouldBeExcludedFromBatch() {
    let harness = build_harness();

    let units = vec![
        unit("u1", "[PLACEHOLDER]"),
        unit("u2", "[[col:y]]Gold[[/col]]"),
    ];
    let (_, stream) = harness.orchestrator.clone().translate_batch(units, french_context());
    let (events, error) = drain(stream).await;

    assert!(error.is_none());
    let terminal = events.last().expect("no events");
    assert_eq!(terminal.current_phase, BatchPhase::Completed);
    assert_eq!(terminal.total_units, 1);
    assert_eq!(terminal.successful_units, 1);

    // No version row may exist for the engine placeholder.
    assert!(
        harness
            .store
            .get_by_unit_and_project_language("u1", "pl-fr")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        harness
            .store
            .get_by_unit_and_project_language("u2", "pl-fr")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_progressStream_countersAndTimestamps_shouldBeMonotonic() {
    let harness = build_harness();
    harness
        .store
        .add_translation("Hello", "Bonjour", "fr", None, 1.0)
        .await
        .unwrap();

    let units = vec![
        unit("u1", "Hello"),
        unit("u2", "Fresh text one"),
        unit("u3", "Fresh text two"),
    ];
    let (_, stream) = harness.orchestrator.clone().translate_batch(units, french_context());
    let (events, error) = drain(stream).await;

    assert!(error.is_none());
    assert!(!events.is_empty());

    for window in events.windows(2) {
        let (prev, next) = (&window[0], &window[1]);
        assert!(next.processed_units >= prev.processed_units);
        assert!(next.successful_units >= prev.successful_units);
        assert!(next.failed_units >= prev.failed_units);
        assert!(next.skipped_units >= prev.skipped_units);
        assert!(next.tokens_used >= prev.tokens_used);
        assert!(next.timestamp >= prev.timestamp);
    }

    let terminal = events.last().unwrap();
    assert_eq!(
        terminal.successful_units + terminal.failed_units + terminal.skipped_units,
        terminal.total_units
    );
}

#[tokio::test]
async fn test_exhaustedRetries_shouldFailBatchWithTerminalEvent() {
    let mut config = OrchestratorConfig::default();
    config.retry = RetryConfig {
        max_retries: 1,
        backoff_base_ms: 1,
    };
    let harness = build_harness_with(config, Arc::new(MockLlm::new()));
    harness.llm.push_steps([
        MockStep::Fail(LlmError::Network("down".into())),
        MockStep::Fail(LlmError::Network("still down".into())),
    ]);

    let (_, stream) = harness
        .orchestrator
        .clone()
        .translate_batch(vec![unit("u1", "Hello")], french_context());
    let (events, error) = drain(stream).await;

    let terminal = events.last().expect("no events");
    assert_eq!(terminal.current_phase, BatchPhase::Failed);
    assert!(matches!(
        error,
        Some(OrchestrationError::Llm(LlmError::Network(_)))
    ));
}

#[tokio::test]
async fn test_promptBuildFailure_shouldFailBatch() {
    use modtrans::llm::BatchTranslationCache;
    use modtrans::orchestrator::{BatchOrchestrator, OrchestratorServices};
    use modtrans::storage::SqliteStore;
    use modtrans::validation::ValidationService;

    use crate::common::mock_services::{MockPromptBuilder, RecordingEventBus};

    let store = SqliteStore::new_in_memory().unwrap();
    let llm = Arc::new(MockLlm::new());
    let orchestrator = BatchOrchestrator::new(
        OrchestratorServices {
            llm: llm.clone(),
            prompt_builder: Arc::new(MockPromptBuilder::failing()),
            tm: Arc::new(store.clone()),
            versions: Arc::new(store.clone()),
            transactions: Arc::new(store),
            event_bus: Arc::new(RecordingEventBus::new()),
        },
        Arc::new(BatchTranslationCache::new()),
        ValidationService::new(),
        OrchestratorConfig::default(),
    );

    let (_, stream) = orchestrator.translate_batch(vec![unit("u1", "Hello")], french_context());
    let (events, error) = drain(stream).await;

    assert_eq!(events.last().unwrap().current_phase, BatchPhase::Failed);
    assert!(matches!(error, Some(OrchestrationError::PromptBuild(_))));
    assert_no_llm_calls(&llm);
}

#[tokio::test]
async fn test_emptyBatch_shouldCompleteImmediately() {
    let harness = build_harness();

    let (_, stream) = harness
        .orchestrator
        .clone()
        .translate_batch(Vec::new(), french_context());
    let (events, error) = drain(stream).await;

    assert!(error.is_none());
    let terminal = events.last().expect("no events");
    assert_eq!(terminal.current_phase, BatchPhase::Completed);
    assert_eq!(terminal.total_units, 0);
    assert_eq!(terminal.skipped_units, 0);
    assert_no_llm_calls(&harness.llm);
}
