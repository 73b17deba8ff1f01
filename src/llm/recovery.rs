/*!
 * Recovery planning for failed LLM translation calls.
 *
 * After the retry handler gives up, the splitter asks this module what
 * to do with the error. The answer is one of four actions: halve the
 * batch and recurse, retry once with a bigger response budget, skip a
 * content-filtered unit, or give up.
 */

use crate::errors::LlmError;

use super::estimator;

/// Depth below which a single-unit parse error earns a token-bump retry
const TOKEN_BUMP_MAX_DEPTH: u32 = 2;

/// What the splitter should do with a failed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Split the unit list in half and translate each half separately
    SplitInHalf,

    /// Re-issue the same request once with a doubled response budget
    RetryWithMoreTokens {
        /// New budget, capped at the estimator maximum
        max_tokens: u32,
    },

    /// Mark the single unit failed and continue with an empty result
    SkipFilteredUnit,

    /// Propagate as a fatal orchestration error
    Fatal,
}

/// Error-to-action decision table
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationErrorRecovery;

impl TranslationErrorRecovery {
    /// Create the default recovery strategy
    pub fn new() -> Self {
        Self
    }

    /// Decide how to recover from `error` for a request of `units_len`
    /// units at recursion `depth` with the current response budget.
    pub fn plan(
        &self,
        error: &LlmError,
        units_len: usize,
        depth: u32,
        current_max_tokens: u32,
    ) -> RecoveryAction {
        match error {
            // The request was too large for the provider. More units
            // than one: halve. A single oversized unit cannot be split
            // and a bigger response budget cannot shrink the input.
            LlmError::TokenLimit(_) => {
                if units_len > 1 {
                    RecoveryAction::SplitInHalf
                } else {
                    RecoveryAction::Fatal
                }
            }

            LlmError::ResponseParse(_) => {
                if units_len > 1 {
                    RecoveryAction::SplitInHalf
                } else if depth < TOKEN_BUMP_MAX_DEPTH {
                    RecoveryAction::RetryWithMoreTokens {
                        max_tokens: estimator::bump_max_tokens(current_max_tokens),
                    }
                } else {
                    RecoveryAction::Fatal
                }
            }

            LlmError::ContentFiltered(_) => {
                if units_len > 1 {
                    RecoveryAction::SplitInHalf
                } else {
                    RecoveryAction::SkipFilteredUnit
                }
            }

            // Retryable kinds arrive here only after retry exhaustion.
            LlmError::Server { .. } | LlmError::RateLimit { .. } | LlmError::Network(_) => {
                RecoveryAction::Fatal
            }
        }
    }
}
