/*!
 * Domain model for the translation orchestration core.
 *
 * Plain value records with derived serialization (no hand-written
 * codecs), split into:
 *
 * - `models`: translation units, versions, contexts, TM matches
 * - `progress`: progress snapshots, batch phases, LLM exchange logs
 */

pub mod models;
pub mod progress;

pub use models::{
    TmMatch, TmMatchType, TranslationContext, TranslationSource, TranslationUnit,
    TranslationVersion, VersionStatus,
};
pub use progress::{BatchPhase, LlmExchangeLog, TranslationProgress};
