/*!
 * Validation and persistence of LLM-produced translations.
 *
 * For each translated unit, in batch order: observe the checkpoint,
 * validate the translation against its source, upsert a translation
 * version, feed the accepted pair back into the TM (best-effort), and
 * emit a progress event with updated counters.
 *
 * Units that reached the LLM phase but received no translation (content
 * filtered, chunk failed) are counted as failed here so every unit ends
 * up in exactly one terminal set.
 */

use std::collections::HashMap;
use std::sync::Arc;

use log::{error, warn};

use crate::domain::{
    BatchPhase, TranslationContext, TranslationSource, TranslationUnit, TranslationVersion,
    VersionStatus,
};
use crate::errors::OrchestrationError;
use crate::progress::BatchProgressManager;
use crate::services::{TranslationMemoryService, TranslationVersionRepository};
use crate::validation::ValidationService;

/// Confidence assigned to LLM-produced translations
const LLM_CONFIDENCE: f64 = 0.8;

/// Result of the persistence stage
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Units persisted with a translation
    pub successful: usize,
    /// Units without a translation or with a failed write
    pub failed: usize,
}

/// Validates and persists the LLM phase's output
pub struct ValidationPersistenceHandler {
    versions: Arc<dyn TranslationVersionRepository>,
    tm: Arc<dyn TranslationMemoryService>,
    validation: ValidationService,
    progress: Arc<BatchProgressManager>,
}

impl ValidationPersistenceHandler {
    /// Create a handler over the injected stores
    pub fn new(
        versions: Arc<dyn TranslationVersionRepository>,
        tm: Arc<dyn TranslationMemoryService>,
        validation: ValidationService,
        progress: Arc<BatchProgressManager>,
    ) -> Self {
        Self {
            versions,
            tm,
            validation,
            progress,
        }
    }

    /// Persist every translated unit, in unit order.
    ///
    /// `llm_translations` are this batch's own LLM results;
    /// `cached_translations` were served by the cross-batch cache and
    /// are persisted with source `tm_exact` (the source is reuse, not a
    /// fresh LLM call).
    pub async fn persist(
        &self,
        batch_id: &str,
        units: &[TranslationUnit],
        llm_translations: &HashMap<String, String>,
        cached_translations: &HashMap<String, String>,
        context: &TranslationContext,
    ) -> Result<PersistOutcome, OrchestrationError> {
        let mut outcome = PersistOutcome::default();
        let total = units.len();

        self.progress.with_snapshot(batch_id, |s| {
            s.set_phase(BatchPhase::Validating, "Validating translations");
        });

        for (index, unit) in units.iter().enumerate() {
            self.progress.await_checkpoint(batch_id).await?;

            let (translated_text, source) = match llm_translations.get(&unit.id) {
                Some(text) => (text.clone(), TranslationSource::Llm),
                None => match cached_translations.get(&unit.id) {
                    Some(text) => (text.clone(), TranslationSource::TmExact),
                    None => {
                        // No translation ever arrived for this unit.
                        outcome.failed += 1;
                        self.progress.with_snapshot(batch_id, |s| {
                            s.add_failed(1);
                            s.set_phase(
                                BatchPhase::Saving,
                                &format!("Unit {} failed ({}/{})", unit.key, index + 1, total),
                            );
                        });
                        continue;
                    }
                },
            };

            let validation_outcome =
                self.validation
                    .validate(&unit.source_text, &translated_text, &context.glossary_terms);

            let mut version = TranslationVersion::new_resolved(
                &unit.id,
                &context.project_language_id,
                &translated_text,
                VersionStatus::Translated,
                LLM_CONFIDENCE,
                source,
            );
            if !validation_outcome.is_clean() {
                match validation_outcome.to_json() {
                    Ok(issues_json) => {
                        version = version.with_validation_issues(issues_json);
                    }
                    Err(e) => {
                        // The validation process itself failed; flag for
                        // review without issue detail.
                        warn!(
                            "Failed to serialize validation issues for unit {}: {}",
                            unit.key, e
                        );
                        version.status = VersionStatus::NeedsReview;
                    }
                }
            }

            if let Err(e) = self.versions.upsert(&version).await {
                error!("Failed to persist translation for unit {}: {}", unit.key, e);
                outcome.failed += 1;
                self.progress.with_snapshot(batch_id, |s| {
                    s.add_failed(1);
                    s.set_phase(
                        BatchPhase::Saving,
                        &format!("Write failed for unit {} ({}/{})", unit.key, index + 1, total),
                    );
                });
                continue;
            }

            // Only fresh LLM output feeds the TM; cache-served pairs
            // were added by the batch that produced them.
            if source == TranslationSource::Llm {
                if let Err(e) = self
                    .tm
                    .add_translation(
                        &unit.source_text,
                        &translated_text,
                        &context.target_language,
                        context.category.as_deref(),
                        LLM_CONFIDENCE,
                    )
                    .await
                {
                    warn!("Failed to add TM entry for unit {}: {}", unit.key, e);
                }
            }

            outcome.successful += 1;
            self.progress.with_snapshot(batch_id, |s| {
                s.add_successful(1);
                s.set_phase(
                    BatchPhase::Saving,
                    &format!("Saved {}/{} translations", index + 1, total),
                );
            });
        }

        Ok(outcome)
    }
}
