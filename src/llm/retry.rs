/*!
 * Retry handling for transient LLM provider errors.
 *
 * Server errors (5xx including 529 Overloaded), rate limits (429), and
 * network errors are retried up to three times with exponential backoff
 * (2 s, 4 s, 8 s). A rate-limit `retry_after` hint overrides the
 * computed delay. Every other error kind is returned to the caller
 * untouched.
 */

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::config::RetryConfig;
use crate::errors::{LlmError, OrchestrationError};
use crate::progress::CancelToken;
use crate::services::{LlmRequest, LlmResponse, LlmService};

/// Bounded-retry wrapper around the LLM service
#[derive(Clone)]
pub struct LlmRetryHandler {
    max_retries: u32,
    backoff_base: Duration,
}

impl Default for LlmRetryHandler {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl LlmRetryHandler {
    /// Create a handler from configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Delay before re-attempting after `attempt` failures
    fn backoff_delay(&self, attempt: u32, error: &LlmError) -> Duration {
        if let LlmError::RateLimit {
            retry_after_secs: Some(secs),
            ..
        } = error
        {
            return Duration::from_secs(*secs);
        }
        // 2^attempt * 2 * base: 2 s, 4 s, 8 s with the default base.
        self.backoff_base * 2 * 2u32.saturating_pow(attempt)
    }

    /// Issue the call, retrying transient errors until exhaustion.
    ///
    /// Cancellation is checked before every attempt; the token is also
    /// forwarded so the service can abort the HTTP request itself.
    pub async fn execute(
        &self,
        service: &Arc<dyn LlmService>,
        request: LlmRequest,
        cancel: CancelToken,
    ) -> Result<LlmResponse, OrchestrationError> {
        let batch_hint = request.request_id.clone();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(OrchestrationError::Cancelled(batch_hint));
            }

            match service.translate_batch(request.clone(), cancel.clone()).await {
                Ok(response) => {
                    if attempt > 0 {
                        debug!(
                            "LLM request {} succeeded after {} retries",
                            request.request_id, attempt
                        );
                    }
                    return Ok(response);
                }
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt, &error);
                    warn!(
                        "LLM request {} attempt {} failed ({}), retrying in {:?}",
                        request.request_id,
                        attempt + 1,
                        error,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(OrchestrationError::Llm(error));
                }
            }
        }
    }
}
