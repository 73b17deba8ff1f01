/*!
 * Common test utilities for the modtrans test suite
 */

use std::sync::Arc;

pub mod mock_services;

use modtrans::config::OrchestratorConfig;
use modtrans::domain::{TranslationContext, TranslationUnit};
use modtrans::llm::BatchTranslationCache;
use modtrans::orchestrator::{BatchOrchestrator, OrchestratorServices};
use modtrans::storage::SqliteStore;
use modtrans::validation::ValidationService;

use mock_services::{MockLlm, MockPromptBuilder, RecordingEventBus};

/// A fully wired orchestrator over mocks and an in-memory store
pub struct TestHarness {
    /// The orchestrator under test
    pub orchestrator: Arc<BatchOrchestrator>,
    /// The mock LLM for call inspection and scripting
    pub llm: Arc<MockLlm>,
    /// The in-memory store backing TM, versions, and transactions
    pub store: SqliteStore,
    /// The process-wide cache instance used by this harness
    pub cache: Arc<BatchTranslationCache>,
    /// Every domain event published during the test
    pub events: Arc<RecordingEventBus>,
}

/// Build a harness with default configuration
pub fn build_harness() -> TestHarness {
    build_harness_with(OrchestratorConfig::default(), Arc::new(MockLlm::new()))
}

/// Build a harness with a custom configuration and LLM mock
pub fn build_harness_with(config: OrchestratorConfig, llm: Arc<MockLlm>) -> TestHarness {
    let store = SqliteStore::new_in_memory().expect("Failed to create test store");
    let cache = Arc::new(BatchTranslationCache::new());
    let events = Arc::new(RecordingEventBus::new());

    let services = OrchestratorServices {
        llm: llm.clone(),
        prompt_builder: Arc::new(MockPromptBuilder::new()),
        tm: Arc::new(store.clone()),
        versions: Arc::new(store.clone()),
        transactions: Arc::new(store.clone()),
        event_bus: events.clone(),
    };

    let orchestrator =
        BatchOrchestrator::new(services, cache.clone(), ValidationService::new(), config);

    TestHarness {
        orchestrator,
        llm,
        store,
        cache,
        events,
    }
}

/// Shorthand for a translation unit
pub fn unit(id: &str, source_text: &str) -> TranslationUnit {
    TranslationUnit::new(id, "project-1", &format!("loc_key_{}", id), source_text)
}

/// Shorthand for a French translation context
pub fn french_context() -> TranslationContext {
    let mut context = TranslationContext::new("project-1", "pl-fr", "fr");
    context.provider_code = "mock".to_string();
    context.model_id = "mock-model".to_string();
    context
}
