/*!
 * Per-batch cache interplay: deduplication, cache probing, and
 * duplicate application.
 *
 * Before the LLM phase the batch's units are deduplicated by source
 * text and probed against the process-wide cache, yielding three
 * buckets: cached (served now), pending (another batch is producing
 * them; await the shared future), and uncached (this batch must
 * translate them). After the LLM phase the results are written back
 * into the cache and fanned out to every duplicate unit.
 *
 * Hot loops yield to the runtime every ~500 items so very large batches
 * cannot starve the event loop.
 */

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::domain::TranslationUnit;
use crate::llm::cache::{BatchTranslationCache, CacheLookup, RegisterOutcome, SharedTranslation};

/// Iterations between cooperative yields in hot in-memory loops
const YIELD_EVERY: usize = 500;

/// The batch's units partitioned against the cross-batch cache
#[derive(Default)]
pub struct CachePartition {
    /// Unique source text -> all units sharing it, insertion-ordered via
    /// `order`
    pub groups: HashMap<String, Vec<TranslationUnit>>,

    /// Unique source texts in first-seen order
    pub order: Vec<String>,

    /// Unit id -> translation served from the cache (duplicates applied)
    pub cached: HashMap<String, String>,

    /// Representative unit per source text this batch must translate
    pub uncached: Vec<TranslationUnit>,

    /// Source text -> cache key for every key this batch owns. Each key
    /// gets exactly one `complete` or `fail`, regardless of error path.
    pub registered: HashMap<String, String>,
}

impl CachePartition {
    /// Number of units resolved from the cache
    pub fn cached_unit_count(&self) -> usize {
        self.cached.len()
    }
}

/// Per-batch manager of the cross-batch translation cache
pub struct LlmCacheManager {
    cache: Arc<BatchTranslationCache>,
}

impl LlmCacheManager {
    /// Create a manager over the process-wide cache
    pub fn new(cache: Arc<BatchTranslationCache>) -> Self {
        Self { cache }
    }

    /// Deduplicate the batch and partition it against the cache.
    ///
    /// With `skip_cache_lookup` (the context skipped translation
    /// memory), existing entries are not consumed but uncached texts are
    /// still registered so concurrent batches can share this batch's
    /// results.
    pub async fn partition(
        &self,
        batch_id: &str,
        units: &[TranslationUnit],
        target_language: &str,
        skip_cache_lookup: bool,
    ) -> CachePartition {
        let mut partition = CachePartition::default();

        // Deduplicate by source text, preserving first-seen order.
        for (index, unit) in units.iter().enumerate() {
            match partition.groups.entry(unit.source_text.clone()) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    entry.get_mut().push(unit.clone());
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    partition.order.push(unit.source_text.clone());
                    entry.insert(vec![unit.clone()]);
                }
            }

            if (index + 1) % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        debug!(
            "Batch {}: {} units deduplicated to {} unique texts",
            batch_id,
            units.len(),
            partition.order.len()
        );

        // Probe the cache per unique text.
        let mut pending: Vec<(String, SharedTranslation)> = Vec::new();
        let order = partition.order.clone();
        for (index, text) in order.iter().enumerate() {
            let key = BatchTranslationCache::hash_key(text, target_language);

            if skip_cache_lookup {
                // Register-only mode: own the key when nobody else does,
                // translate regardless.
                if matches!(
                    self.cache.register_pending(&key, batch_id),
                    RegisterOutcome::Registered
                ) {
                    partition.registered.insert(text.clone(), key);
                }
                let representative = partition.groups[text][0].clone();
                partition.uncached.push(representative);
            } else {
                match self.cache.lookup(&key) {
                    CacheLookup::Hit(translation) => {
                        Self::apply_to_group(&mut partition, text, &translation);
                    }
                    CacheLookup::Pending(future) => {
                        pending.push((text.clone(), future));
                    }
                    CacheLookup::Miss => match self.cache.register_pending(&key, batch_id) {
                        RegisterOutcome::Registered => {
                            partition.registered.insert(text.clone(), key);
                            let representative = partition.groups[text][0].clone();
                            partition.uncached.push(representative);
                        }
                        RegisterOutcome::AlreadyPending(future) => {
                            pending.push((text.clone(), future));
                        }
                        RegisterOutcome::AlreadyHit(translation) => {
                            Self::apply_to_group(&mut partition, text, &translation);
                        }
                    },
                }
            }

            if (index + 1) % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        // Await every in-flight translation owned by other batches.
        for (text, future) in pending {
            match future.await {
                Some(translation) => {
                    Self::apply_to_group(&mut partition, &text, &translation);
                }
                None => {
                    // The owner failed; translate it ourselves. No
                    // second registration: waiting again could chain
                    // onto another failing owner indefinitely.
                    warn!(
                        "Batch {}: shared translation failed for a pending text, translating locally",
                        batch_id
                    );
                    let representative = partition.groups[&text][0].clone();
                    partition.uncached.push(representative);
                }
            }
        }

        partition
    }

    /// Write LLM results into the cache and fan them out to duplicates.
    ///
    /// Returns unit id -> translation for every unit covered by the LLM
    /// results (duplicates included). Registered keys that received no
    /// translation are failed so waiters fall back to themselves.
    pub async fn update_cache_and_apply_duplicates(
        &self,
        partition: &CachePartition,
        llm_translations: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut applied = HashMap::new();

        for (index, representative) in partition.uncached.iter().enumerate() {
            let text = &representative.source_text;
            let translation = llm_translations.get(&representative.id);

            match translation {
                Some(translation) => {
                    if let Some(key) = partition.registered.get(text) {
                        self.cache.complete(key, translation);
                    }
                    if let Some(group) = partition.groups.get(text) {
                        for unit in group {
                            applied.insert(unit.id.clone(), translation.clone());
                        }
                    }
                }
                None => {
                    if let Some(key) = partition.registered.get(text) {
                        self.cache.fail(key);
                    }
                }
            }

            if (index + 1) % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        applied
    }

    /// Fail every key this batch still owns. Called on the error path so
    /// waiters in other batches observe a miss instead of hanging.
    pub fn abort(&self, partition: &CachePartition) {
        for key in partition.registered.values() {
            self.cache.fail(key);
        }
    }

    fn apply_to_group(partition: &mut CachePartition, text: &str, translation: &str) {
        if let Some(group) = partition.groups.get(text) {
            for unit in group {
                partition.cached.insert(unit.id.clone(), translation.to_string());
            }
        }
    }
}
