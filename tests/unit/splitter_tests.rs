/*!
 * Tests for the recursive translation splitter
 */

use std::sync::Arc;

use modtrans::config::RetryConfig;
use modtrans::domain::TranslationUnit;
use modtrans::errors::{LlmError, OrchestrationError};
use modtrans::llm::{LlmRequestTemplate, LlmRetryHandler, TranslationErrorRecovery, TranslationSplitter};
use modtrans::progress::BatchProgressManager;

use crate::common::mock_services::{MockLlm, MockStep, echo_translation};

fn template() -> LlmRequestTemplate {
    LlmRequestTemplate {
        target_language: "fr".to_string(),
        system_prompt: "Translate.".to_string(),
        model_name: Some("mock-model".to_string()),
        provider_code: Some("mock".to_string()),
        game_context: None,
        glossary_terms: None,
    }
}

fn splitter(llm: &Arc<MockLlm>, progress: &Arc<BatchProgressManager>) -> TranslationSplitter {
    progress.register("b1", 10);
    TranslationSplitter::new(
        llm.clone(),
        LlmRetryHandler::new(&RetryConfig {
            max_retries: 0,
            backoff_base_ms: 1,
        }),
        TranslationErrorRecovery::new(),
        progress.clone(),
        "b1",
    )
}

fn units(count: usize) -> Vec<TranslationUnit> {
    (0..count)
        .map(|i| TranslationUnit::new(&format!("u{}", i), "p1", &format!("k{}", i), &format!("Text {}", i)))
        .collect()
}

#[tokio::test]
async fn test_translate_fitsOneBatch_shouldIssueSingleCall() {
    let llm = Arc::new(MockLlm::new());
    let progress = Arc::new(BatchProgressManager::default());
    let splitter = splitter(&llm, &progress);
    let units = units(3);

    let outcome = splitter
        .translate(&units, &template(), 10, 0, None)
        .await
        .unwrap();

    assert_eq!(llm.call_count(), 1);
    assert_eq!(outcome.translations.len(), 3);
    assert_eq!(
        outcome.translations["u0"],
        echo_translation("fr", "Text 0")
    );
    assert_eq!(outcome.logs.len(), 1);
    assert!(outcome.logs[0].error_message.is_none());
}

#[tokio::test]
async fn test_translate_aboveOptimalSize_shouldSplitPreemptively() {
    let llm = Arc::new(MockLlm::new());
    let progress = Arc::new(BatchProgressManager::default());
    let splitter = splitter(&llm, &progress);
    let units = units(4);

    let outcome = splitter
        .translate(&units, &template(), 2, 0, None)
        .await
        .unwrap();

    assert_eq!(llm.call_count(), 2);
    assert_eq!(outcome.translations.len(), 4);
}

#[tokio::test]
async fn test_translate_tokenLimitError_shouldSplitAndRecover() {
    let llm = Arc::new(MockLlm::new());
    llm.push_steps([MockStep::Fail(LlmError::TokenLimit("too big".into()))]);
    let progress = Arc::new(BatchProgressManager::default());
    let splitter = splitter(&llm, &progress);
    let units = units(2);

    let outcome = splitter
        .translate(&units, &template(), 10, 0, None)
        .await
        .unwrap();

    // One failed call, then one per half.
    assert_eq!(llm.call_count(), 3);
    assert_eq!(outcome.translations.len(), 2);
    assert!(
        outcome
            .logs
            .iter()
            .any(|l| l.error_message.as_deref().is_some_and(|m| m.contains("Splitting")))
    );
}

#[tokio::test]
async fn test_translate_parseErrorSingleUnit_shouldRetryWithMoreTokens() {
    let llm = Arc::new(MockLlm::new());
    llm.push_steps([MockStep::Fail(LlmError::ResponseParse("garbage".into()))]);
    let progress = Arc::new(BatchProgressManager::default());
    let splitter = splitter(&llm, &progress);
    let units = units(1);

    let outcome = splitter
        .translate(&units, &template(), 10, 0, None)
        .await
        .unwrap();

    assert_eq!(llm.call_count(), 2);
    assert_eq!(outcome.translations.len(), 1);

    // The retry carried a bigger response budget.
    let calls = llm.calls();
    let first = calls[0].max_tokens.unwrap();
    let second = calls[1].max_tokens.unwrap();
    assert!(second > first);
}

#[tokio::test]
async fn test_translate_contentFilteredSingleUnit_shouldSkipAndLog() {
    let llm = Arc::new(MockLlm::new());
    llm.push_steps([MockStep::Fail(LlmError::ContentFiltered("refused".into()))]);
    let progress = Arc::new(BatchProgressManager::default());
    let splitter = splitter(&llm, &progress);
    let units = units(1);

    let outcome = splitter
        .translate(&units, &template(), 10, 0, None)
        .await
        .unwrap();

    assert!(outcome.translations.is_empty());
    assert_eq!(outcome.failed_units, 1);
    assert!(
        outcome
            .logs
            .iter()
            .any(|l| l.error_message.as_deref().is_some_and(|m| m.contains("k0")))
    );
}

#[tokio::test]
async fn test_translate_depthAboveLimit_shouldFail() {
    let llm = Arc::new(MockLlm::new());
    let progress = Arc::new(BatchProgressManager::default());
    let splitter = splitter(&llm, &progress);
    let units = units(2);

    let result = splitter.translate(&units, &template(), 10, 26, None).await;

    assert!(matches!(
        result,
        Err(OrchestrationError::DepthLimitExceeded { depth: 26, .. })
    ));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_translate_cancelledBatch_shouldRaiseCancelled() {
    let llm = Arc::new(MockLlm::new());
    let progress = Arc::new(BatchProgressManager::default());
    let splitter = splitter(&llm, &progress);
    progress.cancel("b1");
    let units = units(2);

    let result = splitter.translate(&units, &template(), 10, 0, None).await;

    assert!(matches!(result, Err(ref e) if e.is_cancelled()));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_translate_fatalError_shouldPropagate() {
    let llm = Arc::new(MockLlm::new());
    llm.push_steps([MockStep::Fail(LlmError::Network("provider down".into()))]);
    let progress = Arc::new(BatchProgressManager::default());
    let splitter = splitter(&llm, &progress);
    let units = units(2);

    let result = splitter.translate(&units, &template(), 10, 0, None).await;

    assert!(matches!(
        result,
        Err(OrchestrationError::Llm(LlmError::Network(_)))
    ));
}
