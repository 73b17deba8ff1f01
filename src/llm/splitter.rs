/*!
 * Recursive batch splitting for LLM translation calls.
 *
 * The splitter receives a unit list and issues exactly one LLM call when
 * the list fits the optimal batch size, otherwise halves it and recurses
 * sequentially. Failed calls are routed through the recovery strategy,
 * which may also split, bump the response budget, or skip a filtered
 * unit. Recursion depth is capped; pause and cancel are observed at the
 * top of every recursion.
 */

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, warn};
use uuid::Uuid;

use crate::domain::{LlmExchangeLog, TranslationUnit};
use crate::errors::OrchestrationError;
use crate::progress::BatchProgressManager;
use crate::services::{LlmRequest, LlmService};

use super::estimator;
use super::recovery::{RecoveryAction, TranslationErrorRecovery};
use super::retry::LlmRetryHandler;

/// Hard cap on recursive splitting
const MAX_SPLIT_DEPTH: u32 = 25;

/// Callback invoked with each chunk's translations as they land, so the
/// caller can persist progressively instead of waiting for the batch.
pub type ChunkCallback = Arc<dyn Fn(&HashMap<String, String>) + Send + Sync>;

/// Per-batch request parameters shared by every call the splitter issues
#[derive(Debug, Clone)]
pub struct LlmRequestTemplate {
    /// Target language
    pub target_language: String,
    /// System prompt from the prompt builder
    pub system_prompt: String,
    /// Model override
    pub model_name: Option<String>,
    /// Provider code
    pub provider_code: Option<String>,
    /// Game/setting context
    pub game_context: Option<String>,
    /// Glossary terms
    pub glossary_terms: Option<HashMap<String, String>>,
}

impl LlmRequestTemplate {
    /// Build a concrete request for a slice of units
    pub fn instantiate(&self, units: &[TranslationUnit], max_tokens: u32) -> LlmRequest {
        let texts = units
            .iter()
            .map(|u| (u.id.clone(), u.source_text.clone()))
            .collect();

        LlmRequest {
            request_id: Uuid::new_v4().to_string(),
            texts,
            target_language: self.target_language.clone(),
            system_prompt: self.system_prompt.clone(),
            model_name: self.model_name.clone(),
            provider_code: self.provider_code.clone(),
            game_context: self.game_context.clone(),
            glossary_terms: self.glossary_terms.clone(),
            max_tokens: Some(max_tokens),
        }
    }
}

/// Result of translating one unit list, possibly across many LLM calls
#[derive(Debug, Default)]
pub struct SplitOutcome {
    /// Unit id -> normalized translation
    pub translations: HashMap<String, String>,
    /// Exchange logs in call order
    pub logs: Vec<LlmExchangeLog>,
    /// Units given up on (content filtered)
    pub failed_units: usize,
}

impl SplitOutcome {
    fn merge(&mut self, other: SplitOutcome) {
        self.translations.extend(other.translations);
        self.logs.extend(other.logs);
        self.failed_units += other.failed_units;
    }
}

/// Recursive LLM translation driver for one batch
pub struct TranslationSplitter {
    llm: Arc<dyn LlmService>,
    retry: LlmRetryHandler,
    recovery: TranslationErrorRecovery,
    progress: Arc<BatchProgressManager>,
    batch_id: String,
    on_chunk: Option<ChunkCallback>,
}

impl TranslationSplitter {
    /// Create a splitter bound to one batch
    pub fn new(
        llm: Arc<dyn LlmService>,
        retry: LlmRetryHandler,
        recovery: TranslationErrorRecovery,
        progress: Arc<BatchProgressManager>,
        batch_id: &str,
    ) -> Self {
        Self {
            llm,
            retry,
            recovery,
            progress,
            batch_id: batch_id.to_string(),
            on_chunk: None,
        }
    }

    /// Attach a progressive-save callback
    pub fn with_chunk_callback(mut self, callback: ChunkCallback) -> Self {
        self.on_chunk = Some(callback);
        self
    }

    /// Translate `units`, splitting recursively as needed
    pub fn translate<'a>(
        &'a self,
        units: &'a [TranslationUnit],
        template: &'a LlmRequestTemplate,
        optimal_batch_size: usize,
        depth: u32,
        max_tokens_override: Option<u32>,
    ) -> BoxFuture<'a, Result<SplitOutcome, OrchestrationError>> {
        async move {
            self.progress.await_checkpoint(&self.batch_id).await?;

            if units.is_empty() {
                return Ok(SplitOutcome::default());
            }

            if depth > MAX_SPLIT_DEPTH {
                return Err(OrchestrationError::DepthLimitExceeded {
                    batch_id: self.batch_id.clone(),
                    depth,
                });
            }

            // Preemptive split: the list cannot fit one provider call.
            if units.len() > optimal_batch_size.max(1) {
                let mid = units.len() / 2;
                debug!(
                    "Batch {}: splitting {} units at depth {} (optimal {})",
                    self.batch_id,
                    units.len(),
                    depth,
                    optimal_batch_size
                );

                let mut outcome = self
                    .translate(&units[..mid], template, optimal_batch_size, depth + 1, None)
                    .await?;
                let second = self
                    .translate(&units[mid..], template, optimal_batch_size, depth + 1, None)
                    .await?;
                outcome.merge(second);
                return Ok(outcome);
            }

            let max_tokens = max_tokens_override.unwrap_or_else(|| {
                let texts = units
                    .iter()
                    .map(|u| (u.id.clone(), u.source_text.clone()))
                    .collect();
                estimator::estimate_max_tokens(&texts)
            });
            let request = template.instantiate(units, max_tokens);
            let request_id = request.request_id.clone();
            let cancel = self.progress.cancel_token(&self.batch_id);

            match self.retry.execute(&self.llm, request, cancel).await {
                Ok(response) => {
                    let mut translations: HashMap<String, String> = HashMap::new();
                    for (unit_id, text) in &response.translations {
                        translations.insert(unit_id.clone(), normalize_translation(text));
                    }

                    let sample = units
                        .first()
                        .and_then(|u| translations.get(&u.id))
                        .map(|t| truncate_text(t, 80));

                    let log = LlmExchangeLog {
                        request_id,
                        provider_code: response.provider_code.clone(),
                        model_name: response.model_name.clone(),
                        units_count: units.len(),
                        input_tokens: response.input_tokens,
                        output_tokens: response.output_tokens,
                        processing_time_ms: Some(response.processing_time_ms),
                        sample_translation: sample,
                        error_message: None,
                    };

                    if let Some(ref callback) = self.on_chunk {
                        callback(&translations);
                    }

                    Ok(SplitOutcome {
                        translations,
                        logs: vec![log],
                        failed_units: 0,
                    })
                }

                Err(OrchestrationError::Llm(error)) => {
                    let action = self.recovery.plan(&error, units.len(), depth, max_tokens);
                    match action {
                        RecoveryAction::SplitInHalf => {
                            warn!(
                                "Batch {}: {} on {} units, splitting in half at depth {}",
                                self.batch_id,
                                error,
                                units.len(),
                                depth
                            );
                            let split_log = LlmExchangeLog::error(
                                &request_id,
                                template.provider_code.as_deref().unwrap_or(""),
                                template.model_name.as_deref().unwrap_or(""),
                                units.len(),
                                &format!("Splitting after error: {}", error),
                            );

                            let mid = units.len() / 2;
                            let mut outcome = SplitOutcome {
                                logs: vec![split_log],
                                ..Default::default()
                            };
                            let first = self
                                .translate(&units[..mid], template, optimal_batch_size, depth + 1, None)
                                .await?;
                            outcome.merge(first);
                            let second = self
                                .translate(&units[mid..], template, optimal_batch_size, depth + 1, None)
                                .await?;
                            outcome.merge(second);
                            Ok(outcome)
                        }

                        RecoveryAction::RetryWithMoreTokens { max_tokens: bumped } => {
                            warn!(
                                "Batch {}: parse error on single unit, retrying with max_tokens {}",
                                self.batch_id, bumped
                            );
                            self.translate(units, template, optimal_batch_size, depth + 1, Some(bumped))
                                .await
                        }

                        RecoveryAction::SkipFilteredUnit => {
                            let unit_key = units.first().map(|u| u.key.as_str()).unwrap_or("");
                            warn!(
                                "Batch {}: content filtered for unit {}, skipping",
                                self.batch_id, unit_key
                            );
                            let log = LlmExchangeLog::error(
                                &request_id,
                                template.provider_code.as_deref().unwrap_or(""),
                                template.model_name.as_deref().unwrap_or(""),
                                units.len(),
                                &format!("Content filtered for unit {}: {}", unit_key, error),
                            );
                            Ok(SplitOutcome {
                                translations: HashMap::new(),
                                logs: vec![log],
                                failed_units: 1,
                            })
                        }

                        RecoveryAction::Fatal => Err(OrchestrationError::Llm(error)),
                    }
                }

                Err(other) => Err(other),
            }
        }
        .boxed()
    }
}

/// Undo provider escaping: literal `\n` / `\t` sequences become real
/// whitespace.
pub fn normalize_translation(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t").trim().to_string()
}

/// Truncate text to a maximum length with ellipsis
fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_length).collect();
        format!("{}...", truncated)
    }
}
