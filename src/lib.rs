/*!
 * # modtrans - Translation Orchestration Engine
 *
 * A Rust library for translating game-mod string tables with AI,
 * coordinating three sources of truth: a local translation memory, a
 * remote LLM provider, and a persistent store of per-unit translation
 * versions.
 *
 * ## Features
 *
 * - Batch orchestration with pause, resume, and cancellation
 * - Exact and fuzzy translation-memory lookup with auto-accept
 * - Cross-batch translation cache with single-flight semantics
 * - Automatic batch splitting around provider token limits
 * - Retry with exponential backoff for transient provider errors
 * - Validation of placeholders, markup, and glossary terms
 * - Streaming progress with per-batch and merged views
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `domain`: value records (units, versions, contexts, progress)
 * - `services`: injected contracts (LLM, prompts, TM, repositories)
 * - `progress`: per-batch runtime state and checkpoints
 * - `tm`: translation-memory lookup pipeline
 * - `llm`: token estimation, caching, splitting, retries
 * - `validation`: quality checks on produced translations
 * - `persistence`: version upserts and TM feedback
 * - `orchestrator`: the batch pipeline and parallel scheduler
 * - `storage`: SQLite reference implementation of the stores
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Public modules
pub mod config;
pub mod domain;
pub mod errors;
pub mod llm;
pub mod orchestrator;
pub mod persistence;
pub mod progress;
pub mod services;
pub mod storage;
pub mod tm;
pub mod validation;

// Re-export main types for easier usage
pub use config::OrchestratorConfig;
pub use domain::{TranslationContext, TranslationProgress, TranslationUnit, TranslationVersion};
pub use errors::{LlmError, OrchestrationError};
pub use llm::BatchTranslationCache;
pub use orchestrator::{BatchOrchestrator, OrchestratorServices, ParallelBatchHandler};
pub use progress::BatchProgressManager;
