/*!
 * Core domain records: translation units, stored versions, call context,
 * and TM match results.
 *
 * These structures map directly to persisted rows or caller-supplied
 * parameters and provide type-safe access to them.
 */

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable identity of a source string to translate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Opaque unit id
    pub id: String,

    /// Project the unit belongs to
    pub project_id: String,

    /// Stable external key (e.g. the loc key inside a pack file)
    pub key: String,

    /// Source text to translate
    pub source_text: String,

    /// Optional usage context supplied by the source file
    pub context: Option<String>,

    /// Optional translator notes
    pub notes: Option<String>,

    /// Whether the unit no longer exists in the current mod version
    pub is_obsolete: bool,
}

impl TranslationUnit {
    /// Create a unit with just the fields the orchestrator requires
    pub fn new(id: &str, project_id: &str, key: &str, source_text: &str) -> Self {
        Self {
            id: id.to_string(),
            project_id: project_id.to_string(),
            key: key.to_string(),
            source_text: source_text.to_string(),
            context: None,
            notes: None,
            is_obsolete: false,
        }
    }
}

/// Lifecycle status of a stored translation version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Awaiting translation
    Pending,
    /// Translation in flight
    Translating,
    /// Translated, no outstanding issues
    Translated,
    /// Reviewed by a human
    Reviewed,
    /// Approved for export
    Approved,
    /// Translated but flagged for review
    NeedsReview,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionStatus::Pending => write!(f, "pending"),
            VersionStatus::Translating => write!(f, "translating"),
            VersionStatus::Translated => write!(f, "translated"),
            VersionStatus::Reviewed => write!(f, "reviewed"),
            VersionStatus::Approved => write!(f, "approved"),
            VersionStatus::NeedsReview => write!(f, "needs_review"),
        }
    }
}

impl std::str::FromStr for VersionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(VersionStatus::Pending),
            "translating" => Ok(VersionStatus::Translating),
            "translated" => Ok(VersionStatus::Translated),
            "reviewed" => Ok(VersionStatus::Reviewed),
            "approved" => Ok(VersionStatus::Approved),
            "needs_review" => Ok(VersionStatus::NeedsReview),
            _ => Err(anyhow::anyhow!("Invalid version status: {}", s)),
        }
    }
}

/// Where a stored translation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationSource {
    /// Origin unknown (legacy rows)
    Unknown,
    /// Entered by hand
    Manual,
    /// Exact translation-memory match
    TmExact,
    /// Fuzzy translation-memory match
    TmFuzzy,
    /// Produced by an LLM call
    Llm,
}

impl fmt::Display for TranslationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationSource::Unknown => write!(f, "unknown"),
            TranslationSource::Manual => write!(f, "manual"),
            TranslationSource::TmExact => write!(f, "tm_exact"),
            TranslationSource::TmFuzzy => write!(f, "tm_fuzzy"),
            TranslationSource::Llm => write!(f, "llm"),
        }
    }
}

impl std::str::FromStr for TranslationSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(TranslationSource::Unknown),
            "manual" => Ok(TranslationSource::Manual),
            "tm_exact" => Ok(TranslationSource::TmExact),
            "tm_fuzzy" => Ok(TranslationSource::TmFuzzy),
            "llm" => Ok(TranslationSource::Llm),
            _ => Err(anyhow::anyhow!("Invalid translation source: {}", s)),
        }
    }
}

/// The stored translation of one unit for one target language.
///
/// Keyed unique by `(unit_id, project_language_id)`; created on first
/// resolution, upserted on every subsequent one, never deleted by the
/// orchestration core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationVersion {
    /// Row id
    pub id: String,

    /// Unit this version translates
    pub unit_id: String,

    /// Target project language
    pub project_language_id: String,

    /// The translated text, if any resolution has happened
    pub translated_text: Option<String>,

    /// Lifecycle status
    pub status: VersionStatus,

    /// Confidence in [0, 1], when the producing stage reports one
    pub confidence_score: Option<f64>,

    /// Which stage produced the current text
    pub translation_source: TranslationSource,

    /// Serialized validation issues (JSON), when validation flagged any
    pub validation_issues: Option<String>,

    /// Whether a human has edited the text since it was produced
    pub is_manually_edited: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl TranslationVersion {
    /// Create a new version row for a freshly resolved translation
    pub fn new_resolved(
        unit_id: &str,
        project_language_id: &str,
        translated_text: &str,
        status: VersionStatus,
        confidence_score: f64,
        source: TranslationSource,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            unit_id: unit_id.to_string(),
            project_language_id: project_language_id.to_string(),
            translated_text: Some(translated_text.to_string()),
            status,
            confidence_score: Some(confidence_score),
            translation_source: source,
            validation_issues: None,
            is_manually_edited: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach serialized validation issues and flag the version for review
    pub fn with_validation_issues(mut self, issues_json: String) -> Self {
        self.validation_issues = Some(issues_json);
        self.status = VersionStatus::NeedsReview;
        self
    }
}

/// Per-call translation parameters supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationContext {
    /// Project being translated
    pub project_id: String,

    /// Target project language row
    pub project_language_id: String,

    /// Target language code or name, passed to the provider verbatim
    pub target_language: String,

    /// Configured provider row id
    pub provider_id: String,

    /// Provider code (e.g. "anthropic", "openai")
    pub provider_code: String,

    /// Model identifier
    pub model_id: String,

    /// Optional game/setting context injected into prompts
    pub game_context: Option<String>,

    /// Glossary terms, source -> required target
    pub glossary_terms: HashMap<String, String>,

    /// Optional content category (units, buildings, dialog, ...)
    pub category: Option<String>,

    /// Units per LLM call; 0 lets the token estimator decide
    pub units_per_batch: usize,

    /// Number of concurrent LLM pipelines inside one batch (>= 1)
    pub parallel_batches: usize,

    /// Skip TM lookup entirely (cache registration still happens)
    pub skip_translation_memory: bool,
}

impl TranslationContext {
    /// Create a context with sensible defaults for a language pair
    pub fn new(project_id: &str, project_language_id: &str, target_language: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            project_language_id: project_language_id.to_string(),
            target_language: target_language.to_string(),
            provider_id: String::new(),
            provider_code: String::new(),
            model_id: String::new(),
            game_context: None,
            glossary_terms: HashMap::new(),
            category: None,
            units_per_batch: 0,
            parallel_batches: 1,
            skip_translation_memory: false,
        }
    }
}

/// Kind of TM match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TmMatchType {
    /// Similarity 1.0
    Exact,
    /// Similarity in [min_similarity, 1.0)
    Fuzzy,
}

impl fmt::Display for TmMatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TmMatchType::Exact => write!(f, "exact"),
            TmMatchType::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// A translation-memory lookup result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmMatch {
    /// TM entry that produced the match
    pub entry_id: String,

    /// Stored target text
    pub target_text: String,

    /// Similarity between the query and the stored source, in [0, 1]
    pub similarity_score: f64,

    /// Quality of the stored entry, in [0, 1]
    pub quality_score: f64,

    /// Exact or fuzzy
    pub match_type: TmMatchType,
}

impl TmMatch {
    /// Whether this match resolves the unit without review
    pub fn is_auto_acceptable(&self, auto_accept_threshold: f64) -> bool {
        match self.match_type {
            TmMatchType::Exact => true,
            TmMatchType::Fuzzy => self.similarity_score >= auto_accept_threshold,
        }
    }
}
