/*!
 * Concurrent LLM chunk processing inside one batch.
 *
 * When the context allows more than one parallel pipeline and there are
 * enough unique texts, the unit list is sliced into chunks and each
 * chunk is driven by its own splitter concurrently. A chunk's fatal
 * error never aborts its siblings: it is converted into an empty
 * translation map plus an error exchange log, and the affected units
 * surface as failures downstream. Cancellation always propagates.
 */

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::warn;
use uuid::Uuid;

use crate::domain::{BatchPhase, LlmExchangeLog, TranslationUnit};
use crate::errors::OrchestrationError;
use crate::progress::BatchProgressManager;
use crate::services::LlmService;

use super::recovery::TranslationErrorRecovery;
use super::retry::LlmRetryHandler;
use super::splitter::{ChunkCallback, LlmRequestTemplate, SplitOutcome, TranslationSplitter};

impl SplitOutcome {
    /// Tokens consumed by the calls recorded in this outcome
    pub fn tokens_used(&self) -> u64 {
        self.logs
            .iter()
            .map(|log| log.input_tokens + log.output_tokens)
            .sum()
    }
}

/// Drives one chunk of units through a splitter
pub struct SingleBatchProcessor {
    llm: Arc<dyn LlmService>,
    retry: LlmRetryHandler,
    recovery: TranslationErrorRecovery,
    progress: Arc<BatchProgressManager>,
}

impl SingleBatchProcessor {
    /// Create a processor over the shared pipeline dependencies
    pub fn new(
        llm: Arc<dyn LlmService>,
        retry: LlmRetryHandler,
        recovery: TranslationErrorRecovery,
        progress: Arc<BatchProgressManager>,
    ) -> Self {
        Self {
            llm,
            retry,
            recovery,
            progress,
        }
    }

    /// Translate one chunk; every error propagates to the caller
    pub async fn process(
        &self,
        batch_id: &str,
        units: &[TranslationUnit],
        template: &LlmRequestTemplate,
        optimal_batch_size: usize,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<SplitOutcome, OrchestrationError> {
        let mut splitter = TranslationSplitter::new(
            self.llm.clone(),
            self.retry.clone(),
            self.recovery,
            self.progress.clone(),
            batch_id,
        );
        if let Some(callback) = on_chunk {
            splitter = splitter.with_chunk_callback(callback);
        }

        splitter
            .translate(units, template, optimal_batch_size, 0, None)
            .await
    }
}

/// Runs several chunk pipelines concurrently and aggregates them
pub struct ParallelBatchProcessor {
    single: SingleBatchProcessor,
    progress: Arc<BatchProgressManager>,
}

impl ParallelBatchProcessor {
    /// Create a processor over the shared pipeline dependencies
    pub fn new(
        llm: Arc<dyn LlmService>,
        retry: LlmRetryHandler,
        recovery: TranslationErrorRecovery,
        progress: Arc<BatchProgressManager>,
    ) -> Self {
        Self {
            single: SingleBatchProcessor::new(llm, retry, recovery, progress.clone()),
            progress,
        }
    }

    /// Translate `units`, fanning out across up to `parallel_batches`
    /// concurrent chunk pipelines when there is enough work to justify
    /// it.
    pub async fn process(
        &self,
        batch_id: &str,
        units: &[TranslationUnit],
        template: &LlmRequestTemplate,
        optimal_batch_size: usize,
        parallel_batches: usize,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<SplitOutcome, OrchestrationError> {
        if units.is_empty() {
            return Ok(SplitOutcome::default());
        }

        // Not enough unique texts to be worth slicing: one pipeline,
        // errors propagate.
        if parallel_batches <= 1 || units.len() <= parallel_batches {
            return self
                .single
                .process(batch_id, units, template, optimal_batch_size, on_chunk)
                .await;
        }

        let chunk_size = units.len().div_ceil(parallel_batches);
        let chunks: Vec<Vec<TranslationUnit>> = units
            .chunks(chunk_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let total_chunks = chunks.len();

        let results = stream::iter(chunks.into_iter().enumerate())
            .map(|(chunk_index, chunk)| {
                let on_chunk = on_chunk.clone();
                async move {
                    let result = self
                        .single
                        .process(batch_id, &chunk, template, optimal_batch_size, on_chunk)
                        .await;

                    let converted = match result {
                        Ok(outcome) => {
                            self.progress.update_phase_only(
                                batch_id,
                                BatchPhase::LlmTranslation,
                                &format!("Chunk {}/{} translated", chunk_index + 1, total_chunks),
                                &outcome.logs,
                            );
                            Ok(outcome)
                        }
                        Err(error) if error.is_cancelled() => Err(error),
                        Err(error) => {
                            // Absorb the failure so sibling chunks keep
                            // going; the units surface as failed.
                            warn!(
                                "Batch {}: chunk {}/{} failed: {}",
                                batch_id,
                                chunk_index + 1,
                                total_chunks,
                                error
                            );
                            let log = LlmExchangeLog::error(
                                &Uuid::new_v4().to_string(),
                                template.provider_code.as_deref().unwrap_or(""),
                                template.model_name.as_deref().unwrap_or(""),
                                chunk.len(),
                                &format!("Chunk failed: {}", error),
                            );
                            self.progress.update_phase_only(
                                batch_id,
                                BatchPhase::LlmTranslation,
                                &format!("Chunk {}/{} failed", chunk_index + 1, total_chunks),
                                std::slice::from_ref(&log),
                            );
                            Ok(SplitOutcome {
                                translations: Default::default(),
                                logs: vec![log],
                                failed_units: chunk.len(),
                            })
                        }
                    };

                    (chunk_index, converted)
                }
            })
            .buffer_unordered(parallel_batches)
            .collect::<Vec<_>>()
            .await;

        // Merge in original chunk order so logs stay deterministic.
        let mut sorted = results;
        sorted.sort_by_key(|(index, _)| *index);

        let mut aggregate = SplitOutcome::default();
        for (_, result) in sorted {
            let outcome = result?;
            for log in outcome.logs {
                if !aggregate.logs.iter().any(|l| l.request_id == log.request_id) {
                    aggregate.logs.push(log);
                }
            }
            aggregate.translations.extend(outcome.translations);
            aggregate.failed_units += outcome.failed_units;
        }

        Ok(aggregate)
    }
}
