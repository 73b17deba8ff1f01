/*!
 * Exact and fuzzy translation-memory lookup.
 *
 * Two phases over the batch, each iterating in READ chunks: every unit
 * in a chunk is queried concurrently, positive results are collected,
 * and all writes for the chunk are applied in one transaction (a
 * full-text index does not survive interleaved writes). Query errors on
 * individual units are warnings and count as misses; a write failure is
 * fatal to the batch.
 */

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};

use crate::config::TmLookupConfig;
use crate::domain::{
    BatchPhase, TmMatch, TmMatchType, TranslationContext, TranslationSource, TranslationUnit,
    TranslationVersion, VersionStatus,
};
use crate::errors::OrchestrationError;
use crate::progress::BatchProgressManager;
use crate::services::{
    TransactionManager, TranslationMemoryService, TranslationVersionRepository, WriteOp,
};

/// Result of the TM phases for one batch
#[derive(Debug, Default)]
pub struct TmLookupOutcome {
    /// Units resolved by either phase; later stages skip them
    pub resolved_unit_ids: HashSet<String>,

    /// Units resolved by exact match
    pub exact_count: usize,

    /// Units resolved by auto-accepted fuzzy match
    pub fuzzy_count: usize,
}

/// Exact-then-fuzzy TM lookup over one batch
pub struct TmLookupHandler {
    tm: Arc<dyn TranslationMemoryService>,
    versions: Arc<dyn TranslationVersionRepository>,
    transactions: Arc<dyn TransactionManager>,
    progress: Arc<BatchProgressManager>,
    config: TmLookupConfig,
}

impl TmLookupHandler {
    /// Create a handler over the injected stores
    pub fn new(
        tm: Arc<dyn TranslationMemoryService>,
        versions: Arc<dyn TranslationVersionRepository>,
        transactions: Arc<dyn TransactionManager>,
        progress: Arc<BatchProgressManager>,
        config: TmLookupConfig,
    ) -> Self {
        Self {
            tm,
            versions,
            transactions,
            progress,
            config,
        }
    }

    /// Run both phases; returns the set of units the TM resolved
    pub async fn lookup(
        &self,
        batch_id: &str,
        units: &[TranslationUnit],
        context: &TranslationContext,
    ) -> Result<TmLookupOutcome, OrchestrationError> {
        let mut outcome = TmLookupOutcome::default();

        if units.is_empty() {
            self.progress.with_snapshot(batch_id, |s| {
                s.set_phase(BatchPhase::TmExactLookup, "Empty batch, nothing to look up");
            });
            return Ok(outcome);
        }

        self.exact_phase(batch_id, units, context, &mut outcome).await?;
        self.fuzzy_phase(batch_id, units, context, &mut outcome).await?;

        debug!(
            "Batch {}: TM resolved {} units ({} exact, {} fuzzy)",
            batch_id,
            outcome.resolved_unit_ids.len(),
            outcome.exact_count,
            outcome.fuzzy_count
        );
        Ok(outcome)
    }

    async fn exact_phase(
        &self,
        batch_id: &str,
        units: &[TranslationUnit],
        context: &TranslationContext,
        outcome: &mut TmLookupOutcome,
    ) -> Result<(), OrchestrationError> {
        self.progress.with_snapshot(batch_id, |s| {
            s.set_phase(BatchPhase::TmExactLookup, "Searching exact TM matches");
        });

        for chunk in units.chunks(self.config.chunk_size.max(1)) {
            self.progress.await_checkpoint(batch_id).await?;

            let queries = chunk.iter().map(|unit| {
                let tm = self.tm.clone();
                let target_language = context.target_language.clone();
                async move {
                    let result = tm
                        .find_exact_match(&unit.source_text, &target_language)
                        .await;
                    (unit, result)
                }
            });
            let results = join_all(queries).await;

            let mut accepted: Vec<(&TranslationUnit, TmMatch)> = Vec::new();
            for (unit, result) in results {
                match result {
                    Ok(Some(tm_match)) if tm_match.similarity_score >= 1.0 => {
                        accepted.push((unit, tm_match));
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(
                            "TM exact query failed for unit {} ({}), treating as miss",
                            unit.key, error
                        );
                    }
                }
            }

            if !accepted.is_empty() {
                self.persist_matches(context, &accepted, TranslationSource::TmExact)
                    .await?;
                for (unit, _) in &accepted {
                    outcome.resolved_unit_ids.insert(unit.id.clone());
                }
                outcome.exact_count += accepted.len();

                let count = accepted.len();
                self.progress.with_snapshot(batch_id, |s| {
                    s.add_skipped(count);
                    s.set_phase(
                        BatchPhase::TmExactLookup,
                        &format!("{} exact TM matches applied", count),
                    );
                });
            }
        }

        Ok(())
    }

    async fn fuzzy_phase(
        &self,
        batch_id: &str,
        units: &[TranslationUnit],
        context: &TranslationContext,
        outcome: &mut TmLookupOutcome,
    ) -> Result<(), OrchestrationError> {
        let remaining: Vec<&TranslationUnit> = units
            .iter()
            .filter(|u| !outcome.resolved_unit_ids.contains(&u.id))
            .collect();
        if remaining.is_empty() {
            return Ok(());
        }

        // One bulk query up front: units that already carry a persisted
        // translation are not fuzzy candidates.
        let remaining_ids: Vec<String> = remaining.iter().map(|u| u.id.clone()).collect();
        let already_translated = self
            .versions
            .get_translated_unit_ids(&remaining_ids, &context.project_language_id)
            .await
            .map_err(|e| OrchestrationError::Persistence(e.to_string()))?;

        let candidates: Vec<&TranslationUnit> = remaining
            .into_iter()
            .filter(|u| !already_translated.contains(&u.id))
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        self.progress.with_snapshot(batch_id, |s| {
            s.set_phase(BatchPhase::TmFuzzyLookup, "Searching fuzzy TM matches");
        });

        for chunk in candidates.chunks(self.config.chunk_size.max(1)) {
            self.progress.await_checkpoint(batch_id).await?;

            let queries = chunk.iter().map(|unit| {
                let tm = self.tm.clone();
                let target_language = context.target_language.clone();
                let min_similarity = self.config.min_similarity;
                let limit = self.config.fuzzy_limit;
                async move {
                    let result = tm
                        .find_fuzzy_matches(&unit.source_text, &target_language, min_similarity, limit)
                        .await;
                    (*unit, result)
                }
            });
            let results = join_all(queries).await;

            let mut accepted: Vec<(&TranslationUnit, TmMatch)> = Vec::new();
            for (unit, result) in results {
                match result {
                    Ok(matches) => {
                        // Matches below the auto-accept threshold are
                        // discarded here; they surface elsewhere as
                        // suggestions.
                        if let Some(best) = matches.into_iter().next() {
                            if best.match_type == TmMatchType::Fuzzy
                                && best.similarity_score >= self.config.auto_accept_threshold
                            {
                                accepted.push((unit, best));
                            }
                        }
                    }
                    Err(error) => {
                        warn!(
                            "TM fuzzy query failed for unit {} ({}), treating as miss",
                            unit.key, error
                        );
                    }
                }
            }

            if !accepted.is_empty() {
                self.persist_matches(context, &accepted, TranslationSource::TmFuzzy)
                    .await?;
                for (unit, _) in &accepted {
                    outcome.resolved_unit_ids.insert(unit.id.clone());
                }
                outcome.fuzzy_count += accepted.len();

                let count = accepted.len();
                self.progress.with_snapshot(batch_id, |s| {
                    s.add_skipped(count);
                    s.set_phase(
                        BatchPhase::TmFuzzyLookup,
                        &format!("{} fuzzy TM matches auto-accepted", count),
                    );
                });
            }
        }

        Ok(())
    }

    /// Apply a chunk's accepted matches in one transaction, then bump
    /// usage counts best-effort.
    async fn persist_matches(
        &self,
        context: &TranslationContext,
        accepted: &[(&TranslationUnit, TmMatch)],
        source: TranslationSource,
    ) -> Result<(), OrchestrationError> {
        let changed_by = match source {
            TranslationSource::TmExact => "tm_exact",
            TranslationSource::TmFuzzy => "tm_fuzzy",
            _ => "tm",
        };

        let mut ops = Vec::with_capacity(accepted.len() * 2);
        for (unit, tm_match) in accepted {
            let confidence = match source {
                TranslationSource::TmExact => 1.0,
                _ => tm_match.similarity_score,
            };
            ops.push(WriteOp::UpsertVersion(TranslationVersion::new_resolved(
                &unit.id,
                &context.project_language_id,
                &tm_match.target_text,
                VersionStatus::Translated,
                confidence,
                source,
            )));
            ops.push(WriteOp::RecordHistory {
                unit_id: unit.id.clone(),
                project_language_id: context.project_language_id.clone(),
                changed_by: changed_by.to_string(),
                reason: format!(
                    "Translation memory {} match ({:.0}% similarity)",
                    tm_match.match_type,
                    tm_match.similarity_score * 100.0
                ),
            });
        }

        self.transactions
            .execute_transaction(ops)
            .await
            .map_err(|e| OrchestrationError::Persistence(e.to_string()))?;

        // Usage counts are statistics, not state: failures only warn.
        for (unit, tm_match) in accepted {
            if let Err(error) = self.tm.increment_usage_count(&tm_match.entry_id).await {
                warn!(
                    "Failed to bump TM usage count for entry {} (unit {}): {}",
                    tm_match.entry_id, unit.key, error
                );
            }
        }

        Ok(())
    }
}
