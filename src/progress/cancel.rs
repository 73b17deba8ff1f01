/*!
 * Cancellation token passed to in-flight LLM calls.
 *
 * The token mirrors the batch's cancel flag; LLM service implementations
 * should abort their HTTP request when it fires instead of waiting for
 * the next checkpoint.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Cheap, cloneable cancellation handle keyed to one batch
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    /// Create a token that never fires unless `fire` is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation and wake all waiters. Idempotent.
    pub fn fire(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolve when cancellation is requested
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before the flag re-check so a concurrent `fire`
            // cannot slip between them unobserved.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
