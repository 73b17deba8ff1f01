/*!
 * Orchestrator configuration.
 *
 * All tunable knobs of the translation pipeline live here so callers can
 * load them from application settings. Every field has a serde default
 * matching the production values.
 */

use serde::{Deserialize, Serialize};

/// Configuration for the TM lookup phases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmLookupConfig {
    /// Number of units queried concurrently per READ chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Minimum similarity for a fuzzy match to be considered at all
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Similarity at or above which a fuzzy match is persisted without review
    #[serde(default = "default_auto_accept_threshold")]
    pub auto_accept_threshold: f64,

    /// Maximum fuzzy candidates requested per unit
    #[serde(default = "default_fuzzy_limit")]
    pub fuzzy_limit: usize,
}

fn default_chunk_size() -> usize {
    15
}

fn default_min_similarity() -> f64 {
    0.85
}

fn default_auto_accept_threshold() -> f64 {
    0.95
}

fn default_fuzzy_limit() -> usize {
    5
}

impl Default for TmLookupConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_similarity: default_min_similarity(),
            auto_accept_threshold: default_auto_accept_threshold(),
            fuzzy_limit: default_fuzzy_limit(),
        }
    }
}

/// Configuration for the LLM retry handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff in milliseconds; attempt n sleeps `2^n * 2 * base`
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// Configuration for the parallel batch scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of batches allowed to run concurrently, clamped to 1..=20
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
}

fn default_max_concurrent_batches() -> usize {
    3
}

impl SchedulerConfig {
    /// Effective concurrency after clamping
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrent_batches.clamp(1, 20)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_batches: default_max_concurrent_batches(),
        }
    }
}

/// Top-level orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// TM lookup settings
    #[serde(default)]
    pub tm: TmLookupConfig,

    /// LLM retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Parallel batch scheduling settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}
