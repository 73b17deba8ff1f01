/*!
 * External service contracts consumed by the orchestration core.
 *
 * The core is a library: the LLM provider, the prompt builder, the
 * translation memory, the version repository, the transaction manager,
 * and the event bus are all supplied by the surrounding application and
 * injected through these traits. The `storage` module ships a SQLite
 * implementation of the persistence traits.
 */

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{TmMatch, TranslationContext, TranslationUnit, TranslationVersion};
use crate::errors::LlmError;
use crate::progress::CancelToken;

/// One LLM translation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Unique request id, echoed into exchange logs
    pub request_id: String,

    /// Texts to translate, unit id -> source text. Ordered so retries
    /// produce byte-identical prompts.
    pub texts: BTreeMap<String, String>,

    /// Target language
    pub target_language: String,

    /// System prompt built by the prompt builder
    pub system_prompt: String,

    /// Model override, when the context names one
    pub model_name: Option<String>,

    /// Provider code, when the context names one
    pub provider_code: Option<String>,

    /// Game/setting context
    pub game_context: Option<String>,

    /// Glossary terms the provider must honor
    pub glossary_terms: Option<HashMap<String, String>>,

    /// Response token ceiling to request
    pub max_tokens: Option<u32>,
}

/// One LLM translation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Translations, unit id -> translated text
    pub translations: HashMap<String, String>,

    /// Input tokens consumed
    pub input_tokens: u64,

    /// Output tokens produced
    pub output_tokens: u64,

    /// Total tokens
    pub total_tokens: u64,

    /// Provider that served the call
    pub provider_code: String,

    /// Model that served the call
    pub model_name: String,

    /// Provider-side processing time
    pub processing_time_ms: u64,
}

/// Abstract LLM translation provider
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Translate one batch of texts. The cancel token is keyed to the
    /// requesting batch; implementations should abort in-flight HTTP
    /// requests when it fires.
    async fn translate_batch(
        &self,
        request: LlmRequest,
        cancel: CancelToken,
    ) -> Result<LlmResponse, LlmError>;
}

/// Output of the prompt builder
#[derive(Debug, Clone, Default)]
pub struct PromptBundle {
    /// System message for the provider
    pub system_message: String,

    /// Project-level context paragraph, if configured
    pub project_context: Option<String>,

    /// Few-shot examples as (source, target) pairs
    pub few_shot_examples: Vec<(String, String)>,
}

/// Abstract prompt template service
#[async_trait]
pub trait PromptBuilderService: Send + Sync {
    /// Build the prompt bundle for a set of units
    async fn build_prompt(
        &self,
        units: &[TranslationUnit],
        context: &TranslationContext,
        include_examples: bool,
        max_examples: usize,
    ) -> anyhow::Result<PromptBundle>;
}

/// Abstract translation-memory store
#[async_trait]
pub trait TranslationMemoryService: Send + Sync {
    /// Find an exact (similarity 1.0) match for a source text
    async fn find_exact_match(
        &self,
        source_text: &str,
        target_language: &str,
    ) -> anyhow::Result<Option<TmMatch>>;

    /// Find fuzzy matches at or above `min_similarity`, best first
    async fn find_fuzzy_matches(
        &self,
        source_text: &str,
        target_language: &str,
        min_similarity: f64,
        limit: usize,
    ) -> anyhow::Result<Vec<TmMatch>>;

    /// Add an accepted translation to the memory
    async fn add_translation(
        &self,
        source_text: &str,
        target_text: &str,
        target_language: &str,
        category: Option<&str>,
        quality: f64,
    ) -> anyhow::Result<()>;

    /// Bump the usage count of an entry. Best-effort.
    async fn increment_usage_count(&self, entry_id: &str) -> anyhow::Result<()>;
}

/// Abstract store of translation versions
#[async_trait]
pub trait TranslationVersionRepository: Send + Sync {
    /// All versions of a unit across languages
    async fn get_by_unit(&self, unit_id: &str) -> anyhow::Result<Vec<TranslationVersion>>;

    /// The version of a unit for one project language
    async fn get_by_unit_and_project_language(
        &self,
        unit_id: &str,
        project_language_id: &str,
    ) -> anyhow::Result<Option<TranslationVersion>>;

    /// Which of the given units already have a persisted translation
    async fn get_translated_unit_ids(
        &self,
        unit_ids: &[String],
        project_language_id: &str,
    ) -> anyhow::Result<HashSet<String>>;

    /// Insert a new version row
    async fn insert(&self, version: &TranslationVersion) -> anyhow::Result<()>;

    /// Update an existing version row
    async fn update(&self, version: &TranslationVersion) -> anyhow::Result<()>;

    /// Insert or update keyed by `(unit_id, project_language_id)`
    async fn upsert(&self, version: &TranslationVersion) -> anyhow::Result<()>;
}

/// One write inside a transactional batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert-or-update a translation version
    UpsertVersion(TranslationVersion),

    /// Append a history row for an upserted version
    RecordHistory {
        /// Unit the history row describes
        unit_id: String,
        /// Project language of the change
        project_language_id: String,
        /// Actor string, e.g. "tm_exact"
        changed_by: String,
        /// Human-readable reason
        reason: String,
    },
}

/// Abstract transaction boundary.
///
/// Work is expressed as typed write operations rather than a closure so
/// the trait stays object-safe; an implementation applies all ops in a
/// single transaction or none of them.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Apply every op atomically
    async fn execute_transaction(&self, ops: Vec<WriteOp>) -> anyhow::Result<()>;
}

/// Domain events published by the progress manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A batch was paused
    BatchPaused {
        /// Paused batch
        batch_id: String,
    },
    /// A paused batch was resumed
    BatchResumed {
        /// Resumed batch
        batch_id: String,
    },
    /// A batch was cancelled
    BatchCancelled {
        /// Cancelled batch
        batch_id: String,
    },
}

/// Abstract domain event bus
pub trait EventBus: Send + Sync {
    /// Publish an event to application subscribers
    fn publish(&self, event: DomainEvent);
}

/// Event bus that drops everything, for callers that don't wire one
#[derive(Debug, Default, Clone)]
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn publish(&self, _event: DomainEvent) {}
}
