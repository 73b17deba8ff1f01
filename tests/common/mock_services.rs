/*!
 * Mock service implementations for testing
 *
 * This module provides mock implementations of the injected service
 * contracts to avoid external API calls in tests. The LLM mock records
 * every request and can be scripted to fail with specific provider
 * errors before succeeding.
 */

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use modtrans::domain::{TranslationContext, TranslationUnit};
use modtrans::errors::LlmError;
use modtrans::progress::CancelToken;
use modtrans::services::{
    DomainEvent, EventBus, LlmRequest, LlmResponse, LlmService, PromptBuilderService, PromptBundle,
};

/// Deterministic fake translation for a source text
pub fn echo_translation(target_language: &str, source_text: &str) -> String {
    format!("{}::{}", target_language, source_text)
}

/// One scripted step for the mock LLM
pub enum MockStep {
    /// Translate every text in the request
    Succeed,
    /// Fail with the given provider error
    Fail(LlmError),
}

/// Mock LLM service with request recording and scripted failures
pub struct MockLlm {
    calls: Mutex<Vec<LlmRequest>>,
    script: Mutex<VecDeque<MockStep>>,
    poisoned_text: Mutex<Option<(String, LlmError)>>,
    delay: Option<Duration>,
}

impl MockLlm {
    /// Create a mock that succeeds on every call
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            poisoned_text: Mutex::new(None),
            delay: None,
        }
    }

    /// Create a mock that sleeps before answering each call
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Queue scripted steps consumed in order; once drained, calls
    /// succeed.
    pub fn push_steps(&self, steps: impl IntoIterator<Item = MockStep>) {
        self.script.lock().extend(steps);
    }

    /// Fail every request containing the given source text
    pub fn poison_text(&self, source_text: &str, error: LlmError) {
        *self.poisoned_text.lock() = Some((source_text.to_string(), error));
    }

    /// Every request received so far
    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().clone()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Requests whose texts contain the given source text
    pub fn calls_containing(&self, source_text: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.texts.values().any(|t| t == source_text))
            .count()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn translate_batch(
        &self,
        request: LlmRequest,
        _cancel: CancelToken,
    ) -> Result<LlmResponse, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().push(request.clone());

        if let Some((text, error)) = self.poisoned_text.lock().as_ref() {
            if request.texts.values().any(|t| t == text) {
                return Err(error.clone());
            }
        }

        if let Some(step) = self.script.lock().pop_front() {
            match step {
                MockStep::Succeed => {}
                MockStep::Fail(error) => return Err(error),
            }
        }

        let translations = request
            .texts
            .iter()
            .map(|(unit_id, source)| {
                (
                    unit_id.clone(),
                    echo_translation(&request.target_language, source),
                )
            })
            .collect();

        Ok(LlmResponse {
            translations,
            input_tokens: (request.texts.len() * 20) as u64,
            output_tokens: (request.texts.len() * 10) as u64,
            total_tokens: (request.texts.len() * 30) as u64,
            provider_code: "mock".to_string(),
            model_name: "mock-model".to_string(),
            processing_time_ms: 5,
        })
    }
}

/// Mock prompt builder returning a fixed system message
#[derive(Debug, Default)]
pub struct MockPromptBuilder {
    fail: bool,
}

impl MockPromptBuilder {
    /// Create a builder that always succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder that always fails (for fatal-error tests)
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl PromptBuilderService for MockPromptBuilder {
    async fn build_prompt(
        &self,
        _units: &[TranslationUnit],
        context: &TranslationContext,
        _include_examples: bool,
        _max_examples: usize,
    ) -> anyhow::Result<PromptBundle> {
        if self.fail {
            anyhow::bail!("prompt template missing");
        }
        Ok(PromptBundle {
            system_message: format!(
                "You are a professional game translator. Translate into {}.",
                context.target_language
            ),
            project_context: None,
            few_shot_examples: Vec::new(),
        })
    }
}

/// Event bus that records everything it is asked to publish
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEventBus {
    /// Create an empty recording bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    /// Whether an event matching the predicate was published
    pub fn saw(&self, predicate: impl Fn(&DomainEvent) -> bool) -> bool {
        self.events.lock().iter().any(predicate)
    }
}

impl EventBus for RecordingEventBus {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}

/// Helper to assert that the mock LLM was never called
pub fn assert_no_llm_calls(llm: &Arc<MockLlm>) {
    assert_eq!(
        llm.call_count(),
        0,
        "Expected no LLM calls, but found {:?}",
        llm.calls()
            .iter()
            .map(|r| r.request_id.clone())
            .collect::<Vec<_>>()
    );
}
