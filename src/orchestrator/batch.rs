/*!
 * The single-batch translation pipeline.
 *
 * A batch flows through: placeholder exclusion, TM exact/fuzzy lookup,
 * prompt building, the LLM phase (dedup, cross-batch cache, splitting,
 * retries), and validation/persistence. Every stage emits progress
 * through the shared manager; the public surface is a per-batch stream
 * of `Result<TranslationProgress, OrchestrationError>` that ends with
 * exactly one terminal event (`completed`, `failed`, or `cancelled`).
 */

use std::sync::Arc;

use futures::Stream;
use log::{debug, info};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::domain::{BatchPhase, TranslationContext, TranslationProgress, TranslationUnit};
use crate::errors::OrchestrationError;
use crate::llm::{BatchTranslationCache, LlmTranslationHandler};
use crate::persistence::ValidationPersistenceHandler;
use crate::progress::BatchProgressManager;
use crate::services::{
    EventBus, LlmService, PromptBuilderService, TransactionManager, TranslationMemoryService,
    TranslationVersionRepository,
};
use crate::tm::TmLookupHandler;
use crate::validation::{ValidationService, is_placeholder_only};

/// Few-shot examples requested from the prompt builder
const MAX_PROMPT_EXAMPLES: usize = 3;

/// Capacity of the per-batch stream channel
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Everything the orchestrator consumes from the application
pub struct OrchestratorServices {
    /// LLM provider
    pub llm: Arc<dyn LlmService>,
    /// Prompt template service
    pub prompt_builder: Arc<dyn PromptBuilderService>,
    /// Translation memory store
    pub tm: Arc<dyn TranslationMemoryService>,
    /// Translation version store
    pub versions: Arc<dyn TranslationVersionRepository>,
    /// Transaction boundary for chunked TM writes
    pub transactions: Arc<dyn TransactionManager>,
    /// Domain event bus
    pub event_bus: Arc<dyn EventBus>,
}

/// Coordinates one batch at a time through the full pipeline
pub struct BatchOrchestrator {
    progress: Arc<BatchProgressManager>,
    prompt_builder: Arc<dyn PromptBuilderService>,
    tm_handler: TmLookupHandler,
    llm_handler: LlmTranslationHandler,
    persistence_handler: ValidationPersistenceHandler,
}

impl BatchOrchestrator {
    /// Wire the pipeline from injected services, the process-wide
    /// cache, and configuration.
    pub fn new(
        services: OrchestratorServices,
        cache: Arc<BatchTranslationCache>,
        validation: ValidationService,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let progress = Arc::new(BatchProgressManager::new(services.event_bus.clone()));

        let tm_handler = TmLookupHandler::new(
            services.tm.clone(),
            services.versions.clone(),
            services.transactions.clone(),
            progress.clone(),
            config.tm.clone(),
        );
        let llm_handler = LlmTranslationHandler::new(
            services.llm.clone(),
            cache,
            &config.retry,
            progress.clone(),
        );
        let persistence_handler = ValidationPersistenceHandler::new(
            services.versions.clone(),
            services.tm.clone(),
            validation,
            progress.clone(),
        );

        Arc::new(Self {
            progress,
            prompt_builder: services.prompt_builder,
            tm_handler,
            llm_handler,
            persistence_handler,
        })
    }

    /// The progress manager, for pause/resume/cancel and subscriptions
    pub fn progress(&self) -> &Arc<BatchProgressManager> {
        &self.progress
    }

    /// Start translating a batch.
    ///
    /// Returns the generated batch id and the batch's progress stream.
    /// The pipeline runs on a spawned task; dropping the stream does not
    /// cancel it (use `progress().cancel`).
    pub fn translate_batch(
        self: Arc<Self>,
        units: Vec<TranslationUnit>,
        context: TranslationContext,
    ) -> (
        String,
        impl Stream<Item = Result<TranslationProgress, OrchestrationError>> + Send,
    ) {
        let batch_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel::<Result<TranslationProgress, OrchestrationError>>(
            STREAM_CHANNEL_CAPACITY,
        );

        // Register and subscribe before the pipeline starts so the
        // stream misses nothing.
        self.progress.register(&batch_id, 0);
        let mut events = self.progress.subscribe(&batch_id);

        // A failed pipeline parks its error here; the forwarder emits
        // it right after the terminal `failed` event.
        let error_slot: Arc<Mutex<Option<OrchestrationError>>> = Arc::new(Mutex::new(None));

        let forward_slot = error_slot.clone();
        tokio::spawn(async move {
            loop {
                let progress = match events.recv().await {
                    Ok(progress) => progress,
                    // A lagged subscriber missed intermediate snapshots;
                    // the terminal event is still ahead of us.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let terminal = progress.current_phase.is_terminal();
                let failed = progress.current_phase == BatchPhase::Failed;
                if tx.send(Ok(progress)).await.is_err() {
                    break;
                }
                if terminal {
                    if failed {
                        let taken = forward_slot.lock().take();
                        if let Some(error) = taken {
                            let _ = tx.send(Err(error)).await;
                        }
                    }
                    break;
                }
            }
        });

        let orchestrator = self;
        let task_batch_id = batch_id.clone();
        tokio::spawn(async move {
            let result = orchestrator
                .run_batch(&task_batch_id, units, context)
                .await;

            match result {
                Ok(()) => {}
                Err(error) if error.is_cancelled() => {
                    info!("Batch {} cancelled", task_batch_id);
                    orchestrator.progress.with_snapshot(&task_batch_id, |s| {
                        s.set_phase(BatchPhase::Cancelled, "Batch cancelled");
                    });
                }
                Err(error) => {
                    info!("Batch {} failed: {}", task_batch_id, error);
                    let detail = error.to_string();
                    *error_slot.lock() = Some(error);
                    orchestrator.progress.with_snapshot(&task_batch_id, |s| {
                        s.set_phase(BatchPhase::Failed, &detail);
                    });
                }
            }

            // Let the forwarder drain the terminal event before the
            // channel closes.
            tokio::task::yield_now().await;
            orchestrator.progress.cleanup(&task_batch_id);
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        (batch_id, stream)
    }

    /// Drive the pipeline for one batch to its terminal state
    async fn run_batch(
        &self,
        batch_id: &str,
        units: Vec<TranslationUnit>,
        context: TranslationContext,
    ) -> Result<(), OrchestrationError> {
        // Engine placeholders are never translated and never counted.
        let translatable: Vec<TranslationUnit> = units
            .into_iter()
            .filter(|u| !is_placeholder_only(&u.source_text))
            .collect();

        self.progress.register(batch_id, translatable.len());

        if translatable.is_empty() {
            self.progress.with_snapshot(batch_id, |s| {
                s.set_phase(BatchPhase::Completed, "Nothing to translate");
            });
            return Ok(());
        }

        debug!(
            "Batch {}: starting with {} units for language {}",
            batch_id,
            translatable.len(),
            context.target_language
        );

        // Phase 1: translation memory.
        let resolved = if context.skip_translation_memory {
            Default::default()
        } else {
            self.tm_handler
                .lookup(batch_id, &translatable, &context)
                .await?
                .resolved_unit_ids
        };

        let remaining: Vec<TranslationUnit> = translatable
            .iter()
            .filter(|u| !resolved.contains(&u.id))
            .cloned()
            .collect();

        if !remaining.is_empty() {
            // Phase 2: prompt building.
            self.progress.await_checkpoint(batch_id).await?;
            self.progress.with_snapshot(batch_id, |s| {
                s.set_phase(BatchPhase::BuildingPrompt, "Building translation prompt");
            });
            let prompt = self
                .prompt_builder
                .build_prompt(&remaining, &context, true, MAX_PROMPT_EXAMPLES)
                .await
                .map_err(|e| OrchestrationError::PromptBuild(e.to_string()))?;

            // Phase 3: LLM translation.
            self.progress.with_snapshot(batch_id, |s| {
                s.set_phase(
                    BatchPhase::LlmTranslation,
                    &format!("Translating {} units", remaining.len()),
                );
            });
            let llm_outcome = self
                .llm_handler
                .translate(batch_id, &remaining, &context, &prompt, None)
                .await?;

            self.progress.with_snapshot(batch_id, |s| {
                s.add_tokens(llm_outcome.tokens_used);
                s.append_logs(&llm_outcome.logs);
            });

            // Phase 4: validation and persistence.
            self.persistence_handler
                .persist(
                    batch_id,
                    &remaining,
                    &llm_outcome.translations,
                    &llm_outcome.cached,
                    &context,
                )
                .await?;

            // TM feedback happened inside persistence; reflect it as a
            // phase for observers.
            self.progress.with_snapshot(batch_id, |s| {
                s.set_phase(BatchPhase::UpdatingTm, "Translation memory updated");
            });
        }

        // Terminal snapshot.
        self.progress.await_checkpoint(batch_id).await?;
        self.progress.with_snapshot(batch_id, |s| {
            s.set_phase(BatchPhase::Finalizing, "Finalizing batch");
        });
        self.progress.with_snapshot(batch_id, |s| {
            let detail = format!(
                "{} translated, {} from TM, {} failed",
                s.successful_units, s.skipped_units, s.failed_units
            );
            s.set_phase(BatchPhase::Completed, &detail);
        });

        info!("Batch {} completed", batch_id);
        Ok(())
    }
}
