/*!
 * Error types for the translation orchestration core.
 *
 * This module contains custom error types for the LLM call pipeline and
 * the batch orchestrator, using the thiserror crate for ergonomic error
 * definitions.
 */

use thiserror::Error;

/// Errors returned by an LLM translation service
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Server-side error (5xx, including 529 Overloaded)
    #[error("Provider server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message from the provider
        message: String,
    },

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        /// Error message from the provider
        message: String,
        /// Provider-supplied hint for when to retry
        retry_after_secs: Option<u64>,
    },

    /// Error establishing or maintaining a connection, including timeouts
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded the provider's token limit
    #[error("Token limit exceeded: {0}")]
    TokenLimit(String),

    /// The provider's response could not be parsed into translations
    #[error("Failed to parse provider response: {0}")]
    ResponseParse(String),

    /// The provider refused to translate the content
    #[error("Content filtered by provider: {0}")]
    ContentFiltered(String),
}

impl LlmError {
    /// Whether the retry handler may re-issue the call
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Server { .. } | LlmError::RateLimit { .. } | LlmError::Network(_)
        )
    }
}

/// Errors raised by the batch orchestrator and its stages
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// The batch was cancelled; observed at a checkpoint. Not a failure.
    #[error("Batch {0} was cancelled")]
    Cancelled(String),

    /// The recursive splitter exceeded its depth limit
    #[error("Batch {batch_id} exceeded split depth limit at depth {depth}")]
    DepthLimitExceeded {
        /// Batch that hit the limit
        batch_id: String,
        /// Recursion depth reached
        depth: u32,
    },

    /// Pause/resume requested in an invalid state
    #[error("Invalid state for batch {batch_id}: {reason}")]
    InvalidState {
        /// Batch the operation targeted
        batch_id: String,
        /// Human-readable explanation
        reason: String,
    },

    /// Prompt construction failed before any LLM call was made
    #[error("Prompt build failed: {0}")]
    PromptBuild(String),

    /// A database write failed in a way the batch cannot recover from
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// An LLM error that survived retry and recovery
    #[error("LLM translation failed: {0}")]
    Llm(#[from] LlmError),

    /// Any other unrecoverable condition
    #[error("Orchestration error: {0}")]
    Other(String),
}

impl OrchestrationError {
    /// Whether this error is a cancellation marker rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestrationError::Cancelled(_))
    }
}

impl From<anyhow::Error> for OrchestrationError {
    fn from(error: anyhow::Error) -> Self {
        Self::Other(error.to_string())
    }
}
