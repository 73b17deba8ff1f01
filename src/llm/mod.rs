/*!
 * LLM translation pipeline for units the TM did not resolve.
 *
 * Submodules:
 * - `cache`: process-wide cross-batch translation cache
 * - `cache_manager`: per-batch dedup and cache interplay
 * - `estimator`: token estimation and batch sizing
 * - `retry`: bounded retry with backoff
 * - `recovery`: error-to-action decision table
 * - `splitter`: recursive batch halving around single LLM calls
 * - `parallel`: concurrent chunk pipelines and aggregation
 *
 * `LlmTranslationHandler` composes them into the batch's LLM phase.
 */

pub mod cache;
pub mod cache_manager;
pub mod estimator;
pub mod parallel;
pub mod recovery;
pub mod retry;
pub mod splitter;

pub use cache::BatchTranslationCache;
pub use cache_manager::LlmCacheManager;
pub use parallel::{ParallelBatchProcessor, SingleBatchProcessor};
pub use recovery::{RecoveryAction, TranslationErrorRecovery};
pub use retry::LlmRetryHandler;
pub use splitter::{ChunkCallback, LlmRequestTemplate, SplitOutcome, TranslationSplitter};

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::config::RetryConfig;
use crate::domain::{TranslationContext, TranslationUnit};
use crate::errors::OrchestrationError;
use crate::progress::BatchProgressManager;
use crate::services::{LlmService, PromptBundle};

/// Result of the batch's LLM phase
#[derive(Debug, Default)]
pub struct LlmPhaseOutcome {
    /// Unit id -> translation produced by this batch's LLM calls,
    /// duplicates within the batch already applied
    pub translations: HashMap<String, String>,

    /// Unit id -> translation served from the cross-batch cache. These
    /// count as successes persisted with source `tm_exact`.
    pub cached: HashMap<String, String>,

    /// Exchange logs in call order
    pub logs: Vec<crate::domain::LlmExchangeLog>,

    /// Tokens consumed by this batch's calls
    pub tokens_used: u64,
}

/// The batch's LLM stage: dedup, cache, split, translate, re-apply
pub struct LlmTranslationHandler {
    cache_manager: LlmCacheManager,
    processor: ParallelBatchProcessor,
}

impl LlmTranslationHandler {
    /// Create a handler over the shared pipeline dependencies
    pub fn new(
        llm: Arc<dyn LlmService>,
        cache: Arc<BatchTranslationCache>,
        retry_config: &RetryConfig,
        progress: Arc<BatchProgressManager>,
    ) -> Self {
        let retry = LlmRetryHandler::new(retry_config);
        let recovery = TranslationErrorRecovery::new();
        Self {
            cache_manager: LlmCacheManager::new(cache),
            processor: ParallelBatchProcessor::new(llm, retry, recovery, progress),
        }
    }

    /// Translate every unit the TM did not resolve.
    ///
    /// On a fatal error all cache keys registered by this batch are
    /// failed first so waiters in other batches observe a miss.
    pub async fn translate(
        &self,
        batch_id: &str,
        units: &[TranslationUnit],
        context: &TranslationContext,
        prompt: &PromptBundle,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<LlmPhaseOutcome, OrchestrationError> {
        if units.is_empty() {
            return Ok(LlmPhaseOutcome::default());
        }

        let partition = self
            .cache_manager
            .partition(
                batch_id,
                units,
                &context.target_language,
                context.skip_translation_memory,
            )
            .await;

        if !partition.cached.is_empty() {
            info!(
                "Batch {}: {} units served from the cross-batch cache",
                batch_id,
                partition.cached.len()
            );
        }

        if partition.uncached.is_empty() {
            return Ok(LlmPhaseOutcome {
                cached: partition.cached.clone(),
                ..Default::default()
            });
        }

        let optimal_batch_size =
            estimator::calculate_optimal_batch_size(prompt, &partition.uncached, context);
        debug!(
            "Batch {}: {} unique texts to translate, optimal call size {}",
            batch_id,
            partition.uncached.len(),
            optimal_batch_size
        );

        let template = LlmRequestTemplate {
            target_language: context.target_language.clone(),
            system_prompt: prompt.system_message.clone(),
            model_name: if context.model_id.is_empty() {
                None
            } else {
                Some(context.model_id.clone())
            },
            provider_code: if context.provider_code.is_empty() {
                None
            } else {
                Some(context.provider_code.clone())
            },
            game_context: context.game_context.clone(),
            glossary_terms: if context.glossary_terms.is_empty() {
                None
            } else {
                Some(context.glossary_terms.clone())
            },
        };

        let outcome = match self
            .processor
            .process(
                batch_id,
                &partition.uncached,
                &template,
                optimal_batch_size,
                context.parallel_batches,
                on_chunk,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                self.cache_manager.abort(&partition);
                return Err(error);
            }
        };

        let tokens_used = outcome.tokens_used();
        let applied = self
            .cache_manager
            .update_cache_and_apply_duplicates(&partition, &outcome.translations)
            .await;

        Ok(LlmPhaseOutcome {
            translations: applied,
            cached: partition.cached.clone(),
            logs: outcome.logs,
            tokens_used,
        })
    }
}
