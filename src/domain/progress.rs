/*!
 * Progress snapshots and LLM exchange logs.
 *
 * A `TranslationProgress` is the event record a batch emits to its
 * subscribers. Counters and the timestamp are monotonically
 * non-decreasing within a batch; mutation goes through the methods here
 * so that invariant holds everywhere.
 */

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a running batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    /// Exact TM lookup chunks
    TmExactLookup,
    /// Fuzzy TM lookup chunks
    TmFuzzyLookup,
    /// Prompt construction
    BuildingPrompt,
    /// LLM calls in flight
    LlmTranslation,
    /// Validating produced translations
    Validating,
    /// Upserting translation versions
    Saving,
    /// Feeding accepted translations back into the TM
    UpdatingTm,
    /// Computing the final snapshot
    Finalizing,
    /// Terminal: all units accounted for
    Completed,
    /// Terminal: unrecoverable error
    Failed,
    /// Batch is paused at a checkpoint
    Paused,
    /// Terminal: cancelled by the caller
    Cancelled,
}

impl BatchPhase {
    /// Whether this phase ends the batch's progress stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchPhase::Completed | BatchPhase::Failed | BatchPhase::Cancelled
        )
    }
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchPhase::TmExactLookup => "tm_exact_lookup",
            BatchPhase::TmFuzzyLookup => "tm_fuzzy_lookup",
            BatchPhase::BuildingPrompt => "building_prompt",
            BatchPhase::LlmTranslation => "llm_translation",
            BatchPhase::Validating => "validating",
            BatchPhase::Saving => "saving",
            BatchPhase::UpdatingTm => "updating_tm",
            BatchPhase::Finalizing => "finalizing",
            BatchPhase::Completed => "completed",
            BatchPhase::Failed => "failed",
            BatchPhase::Paused => "paused",
            BatchPhase::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Append-only record of one LLM call or a recovered error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmExchangeLog {
    /// Request id the call carried
    pub request_id: String,

    /// Provider code that served the call
    pub provider_code: String,

    /// Model that served the call
    pub model_name: String,

    /// Number of units in the request
    pub units_count: usize,

    /// Input tokens consumed
    pub input_tokens: u64,

    /// Output tokens produced
    pub output_tokens: u64,

    /// Wall-clock processing time reported by the provider
    pub processing_time_ms: Option<u64>,

    /// One sample translation for quick eyeballing
    pub sample_translation: Option<String>,

    /// Error message when the exchange failed or was recovered
    pub error_message: Option<String>,
}

impl LlmExchangeLog {
    /// Record for a failed or recovered exchange
    pub fn error(request_id: &str, provider_code: &str, model_name: &str, units_count: usize, message: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            provider_code: provider_code.to_string(),
            model_name: model_name.to_string(),
            units_count,
            input_tokens: 0,
            output_tokens: 0,
            processing_time_ms: None,
            sample_translation: None,
            error_message: Some(message.to_string()),
        }
    }
}

/// The progress snapshot a batch emits to its subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationProgress {
    /// Batch this snapshot belongs to
    pub batch_id: String,

    /// Current phase
    pub current_phase: BatchPhase,

    /// Human-readable phase detail
    pub phase_detail: String,

    /// Units with a terminal outcome so far
    pub processed_units: usize,

    /// Units resolved with a translation
    pub successful_units: usize,

    /// Units that failed
    pub failed_units: usize,

    /// Units resolved by the TM (skipped the LLM)
    pub skipped_units: usize,

    /// Total units in the batch after placeholder exclusion
    pub total_units: usize,

    /// Tokens consumed so far, monotonically non-decreasing
    pub tokens_used: u64,

    /// Fraction of the batch resolved by TM reuse, in [0, 1]
    pub tm_reuse_rate: f64,

    /// Append-only LLM exchange log
    pub llm_logs: Vec<LlmExchangeLog>,

    /// Snapshot timestamp
    pub timestamp: DateTime<Utc>,
}

impl TranslationProgress {
    /// Initial snapshot for a freshly registered batch
    pub fn new(batch_id: &str, total_units: usize) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            current_phase: BatchPhase::TmExactLookup,
            phase_detail: String::new(),
            processed_units: 0,
            successful_units: 0,
            failed_units: 0,
            skipped_units: 0,
            total_units,
            tokens_used: 0,
            tm_reuse_rate: 0.0,
            llm_logs: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Move to a new phase, refreshing detail and timestamp
    pub fn set_phase(&mut self, phase: BatchPhase, detail: &str) {
        self.current_phase = phase;
        self.phase_detail = detail.to_string();
        self.touch();
    }

    /// Record TM-resolved units
    pub fn add_skipped(&mut self, count: usize) {
        self.skipped_units += count;
        self.processed_units += count;
        self.recompute_reuse_rate();
        self.touch();
    }

    /// Record a successfully translated unit
    pub fn add_successful(&mut self, count: usize) {
        self.successful_units += count;
        self.processed_units += count;
        self.touch();
    }

    /// Record a failed unit
    pub fn add_failed(&mut self, count: usize) {
        self.failed_units += count;
        self.processed_units += count;
        self.touch();
    }

    /// Add newly consumed tokens
    pub fn add_tokens(&mut self, tokens: u64) {
        self.tokens_used += tokens;
        self.touch();
    }

    /// Append exchange logs, deduplicating by request id
    pub fn append_logs(&mut self, logs: &[LlmExchangeLog]) {
        for log in logs {
            if !self.llm_logs.iter().any(|l| l.request_id == log.request_id) {
                self.llm_logs.push(log.clone());
            }
        }
        self.touch();
    }

    /// Whether every unit reached a terminal set
    pub fn is_fully_accounted(&self) -> bool {
        self.successful_units + self.failed_units + self.skipped_units == self.total_units
    }

    fn recompute_reuse_rate(&mut self) {
        if self.total_units > 0 {
            self.tm_reuse_rate = self.skipped_units as f64 / self.total_units as f64;
        }
    }

    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.timestamp {
            self.timestamp = now;
        }
    }
}
