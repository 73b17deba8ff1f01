/*!
 * Process-wide cross-batch translation cache.
 *
 * Keyed by a stable hash of `(source_text, target_language)`, each entry
 * follows a three-state machine:
 *
 * - `Miss`: no batch has produced or started producing this translation.
 *   A caller may transition to `Pending` via `register_pending`; exactly
 *   one caller wins.
 * - `Pending`: a batch owns the translation. Concurrent callers receive
 *   a shared future and await it instead of issuing a duplicate LLM
 *   call.
 * - `Hit`: the translation is available and served immediately.
 *
 * `complete` moves `Pending` to `Hit` exactly once; `fail` invalidates
 * the entry and every waiter observes a miss. All transitions happen
 * under a single lock.
 *
 * The cache has an explicit process lifecycle (`init` / `get` /
 * `shutdown`); orchestrators receive it as a constructor argument.
 */

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;

/// Future shared by every waiter on a pending entry. Resolves to `None`
/// when the owning batch failed to produce the translation.
pub type SharedTranslation = Shared<BoxFuture<'static, Option<String>>>;

/// Result of probing the cache
pub enum CacheLookup {
    /// Translation available now
    Hit(String),
    /// Another batch is producing it; await this future
    Pending(SharedTranslation),
    /// Nobody has started on it
    Miss,
}

/// Result of trying to claim a key
pub enum RegisterOutcome {
    /// This caller owns the key and must call `complete` or `fail`
    Registered,
    /// Another batch owns it; await the shared future
    AlreadyPending(SharedTranslation),
    /// Resolved while we were deciding
    AlreadyHit(String),
}

/// Hit/miss counters, in the spirit of a cache worth measuring
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Lookups served from a completed entry
    pub hits: usize,
    /// Lookups that found nothing
    pub misses: usize,
    /// Lookups that joined an in-flight translation
    pub pending_joins: usize,
    /// Completed entries currently stored
    pub entries: usize,
}

impl CacheStats {
    /// Overall hit rate in percent, pending joins counted as hits
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.pending_joins;
        if total == 0 {
            return 0.0;
        }
        ((self.hits + self.pending_joins) as f64 / total as f64) * 100.0
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        format!(
            "Cache: {} hits, {} joins, {} misses, {} entries, {:.1}% hit rate",
            self.hits,
            self.pending_joins,
            self.misses,
            self.entries,
            self.hit_rate()
        )
    }
}

enum EntryState {
    Hit(String),
    Pending {
        future: SharedTranslation,
        owner_batch_id: String,
    },
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, EntryState>,
    senders: HashMap<String, oneshot::Sender<Option<String>>>,
    stats: CacheStats,
}

/// Process-wide, in-memory translation cache
#[derive(Default)]
pub struct BatchTranslationCache {
    inner: Mutex<CacheInner>,
}

impl BatchTranslationCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable key for a `(source_text, target_language)` pair
    pub fn hash_key(source_text: &str, target_language: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_text.as_bytes());
        hasher.update([0x1f]);
        hasher.update(target_language.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Probe the cache for a key
    pub fn lookup(&self, key: &str) -> CacheLookup {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(EntryState::Hit(translation)) => {
                let translation = translation.clone();
                inner.stats.hits += 1;
                CacheLookup::Hit(translation)
            }
            Some(EntryState::Pending { future, .. }) => {
                let future = future.clone();
                inner.stats.pending_joins += 1;
                CacheLookup::Pending(future)
            }
            None => {
                inner.stats.misses += 1;
                CacheLookup::Miss
            }
        }
    }

    /// Try to claim a key for the given batch. Exactly one concurrent
    /// caller receives `Registered`; the rest share the pending future.
    pub fn register_pending(&self, key: &str, owner_batch_id: &str) -> RegisterOutcome {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(EntryState::Hit(translation)) => {
                return RegisterOutcome::AlreadyHit(translation.clone());
            }
            Some(EntryState::Pending { future, .. }) => {
                return RegisterOutcome::AlreadyPending(future.clone());
            }
            None => {}
        }

        let (tx, rx) = oneshot::channel::<Option<String>>();
        // A dropped sender (owner died without complete/fail) resolves
        // waiters to a miss.
        let future: SharedTranslation = rx.map(|result| result.ok().flatten()).boxed().shared();

        inner.senders.insert(key.to_string(), tx);
        inner.entries.insert(
            key.to_string(),
            EntryState::Pending {
                future,
                owner_batch_id: owner_batch_id.to_string(),
            },
        );

        debug!("Cache key {} registered pending by batch {}", &key[..12.min(key.len())], owner_batch_id);
        RegisterOutcome::Registered
    }

    /// Terminal transition `Pending -> Hit`. Waiters receive the
    /// translation. Inserting over a missing entry stores a plain hit.
    pub fn complete(&self, key: &str, translation: &str) {
        let sender = {
            let mut inner = self.inner.lock();
            let sender = inner.senders.remove(key);
            inner
                .entries
                .insert(key.to_string(), EntryState::Hit(translation.to_string()));
            inner.stats.entries = inner
                .entries
                .values()
                .filter(|e| matches!(e, EntryState::Hit(_)))
                .count();
            sender
        };

        if let Some(tx) = sender {
            let _ = tx.send(Some(translation.to_string()));
        }
    }

    /// Terminal transition `Pending -> Miss`. Waiters observe a miss and
    /// fall back to translating themselves. Completed entries are left
    /// intact.
    pub fn fail(&self, key: &str) {
        let sender = {
            let mut inner = self.inner.lock();
            let sender = inner.senders.remove(key);
            if matches!(inner.entries.get(key), Some(EntryState::Pending { .. })) {
                inner.entries.remove(key);
            }
            sender
        };

        if let Some(tx) = sender {
            let _ = tx.send(None);
        }
    }

    /// Current statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        stats.entries = inner
            .entries
            .values()
            .filter(|e| matches!(e, EntryState::Hit(_)))
            .count();
        stats
    }

    /// Drop every entry and counter
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.senders.clear();
        inner.stats = CacheStats::default();
    }
}

static GLOBAL_CACHE: Lazy<RwLock<Option<Arc<BatchTranslationCache>>>> =
    Lazy::new(|| RwLock::new(None));

/// Initialize the process-wide cache, returning the shared handle.
/// Idempotent: a second call returns the existing instance.
pub fn init() -> Arc<BatchTranslationCache> {
    let mut global = GLOBAL_CACHE.write();
    match global.as_ref() {
        Some(cache) => cache.clone(),
        None => {
            let cache = Arc::new(BatchTranslationCache::new());
            *global = Some(cache.clone());
            cache
        }
    }
}

/// The process-wide cache, if initialized
pub fn get() -> Option<Arc<BatchTranslationCache>> {
    GLOBAL_CACHE.read().clone()
}

/// Tear down the process-wide cache. Batches holding an `Arc` keep
/// working against their own handle.
pub fn shutdown() {
    *GLOBAL_CACHE.write() = None;
}
