/*!
 * Authoritative in-memory state of every active batch.
 *
 * The manager owns, per batch id: the current progress snapshot, the
 * pause flag, the cancel flag, the resume signal, and a broadcast
 * channel fanning progress events out to subscribers.
 *
 * `await_checkpoint` is the only suspension point at which pause and
 * cancel become observable. Every stage calls it at its natural
 * boundaries (start of an LLM chunk, before each TM query chunk, before
 * the second half of a split).
 */

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};

use crate::domain::{BatchPhase, LlmExchangeLog, TranslationProgress};
use crate::errors::OrchestrationError;
use crate::services::{DomainEvent, EventBus, NullEventBus};

use super::cancel::CancelToken;

/// Broadcast channel capacity per batch. Slow subscribers that fall more
/// than this far behind observe a lagged error and miss events.
const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Runtime state of one active batch
struct BatchRuntime {
    snapshot: TranslationProgress,
    paused: bool,
    cancel: CancelToken,
    resume: Arc<Notify>,
    sender: broadcast::Sender<TranslationProgress>,
    cancel_event_published: bool,
}

impl BatchRuntime {
    fn new(batch_id: &str, total_units: usize) -> Self {
        let (sender, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            snapshot: TranslationProgress::new(batch_id, total_units),
            paused: false,
            cancel: CancelToken::new(),
            resume: Arc::new(Notify::new()),
            sender,
            cancel_event_published: false,
        }
    }
}

/// Manager of per-batch runtime state and progress fan-out
pub struct BatchProgressManager {
    batches: Mutex<HashMap<String, BatchRuntime>>,
    event_bus: Arc<dyn EventBus>,
}

impl Default for BatchProgressManager {
    fn default() -> Self {
        Self::new(Arc::new(NullEventBus))
    }
}

impl BatchProgressManager {
    /// Create a manager publishing lifecycle events on the given bus
    pub fn new(event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            batches: Mutex::new(HashMap::new()),
            event_bus,
        }
    }

    /// Register a batch, creating its runtime state and initial snapshot
    pub fn register(&self, batch_id: &str, total_units: usize) {
        let mut batches = self.batches.lock();
        batches
            .entry(batch_id.to_string())
            .or_insert_with(|| BatchRuntime::new(batch_id, total_units));
        // A subscriber may have created the runtime before registration
        // with a zero total; fix it up.
        if let Some(runtime) = batches.get_mut(batch_id) {
            runtime.snapshot.total_units = total_units;
        }
    }

    /// Subscribe to a batch's progress events
    pub fn subscribe(&self, batch_id: &str) -> broadcast::Receiver<TranslationProgress> {
        let mut batches = self.batches.lock();
        batches
            .entry(batch_id.to_string())
            .or_insert_with(|| BatchRuntime::new(batch_id, 0))
            .sender
            .subscribe()
    }

    /// Overwrite the snapshot and fan it out to subscribers
    pub fn update_progress(&self, batch_id: &str, progress: TranslationProgress) {
        let mut batches = self.batches.lock();
        if let Some(runtime) = batches.get_mut(batch_id) {
            runtime.snapshot = progress;
            // A send error only means nobody is listening right now.
            let _ = runtime.sender.send(runtime.snapshot.clone());
        }
    }

    /// Mutate the current snapshot in place and fan out the result
    pub fn with_snapshot<F>(&self, batch_id: &str, mutate: F)
    where
        F: FnOnce(&mut TranslationProgress),
    {
        let mut batches = self.batches.lock();
        if let Some(runtime) = batches.get_mut(batch_id) {
            mutate(&mut runtime.snapshot);
            let _ = runtime.sender.send(runtime.snapshot.clone());
        }
    }

    /// Update only phase, detail, logs, and timestamp.
    ///
    /// Used by concurrent LLM chunks: counters are reserved for the
    /// validation layer so interleaved chunk updates cannot regress them.
    pub fn update_phase_only(
        &self,
        batch_id: &str,
        phase: BatchPhase,
        detail: &str,
        logs: &[LlmExchangeLog],
    ) {
        self.with_snapshot(batch_id, |snapshot| {
            snapshot.set_phase(phase, detail);
            snapshot.append_logs(logs);
        });
    }

    /// Current snapshot of a batch, if it is active
    pub fn snapshot(&self, batch_id: &str) -> Option<TranslationProgress> {
        self.batches.lock().get(batch_id).map(|r| r.snapshot.clone())
    }

    /// Pause an active batch. Fails if the batch is unknown or already
    /// paused.
    pub fn pause(&self, batch_id: &str) -> Result<(), OrchestrationError> {
        {
            let mut batches = self.batches.lock();
            let runtime = batches.get_mut(batch_id).ok_or_else(|| {
                OrchestrationError::InvalidState {
                    batch_id: batch_id.to_string(),
                    reason: "cannot pause: batch is not active".to_string(),
                }
            })?;

            if runtime.paused {
                return Err(OrchestrationError::InvalidState {
                    batch_id: batch_id.to_string(),
                    reason: "cannot pause: batch is already paused".to_string(),
                });
            }
            if runtime.cancel.is_cancelled() {
                return Err(OrchestrationError::InvalidState {
                    batch_id: batch_id.to_string(),
                    reason: "cannot pause: batch is cancelled".to_string(),
                });
            }

            runtime.paused = true;
            runtime.snapshot.set_phase(BatchPhase::Paused, "Paused by user");
            let _ = runtime.sender.send(runtime.snapshot.clone());
        }

        debug!("Batch {} paused", batch_id);
        self.event_bus.publish(DomainEvent::BatchPaused {
            batch_id: batch_id.to_string(),
        });
        Ok(())
    }

    /// Resume a paused batch. Fails if the batch is not paused.
    pub fn resume(&self, batch_id: &str) -> Result<(), OrchestrationError> {
        {
            let mut batches = self.batches.lock();
            let runtime = batches.get_mut(batch_id).ok_or_else(|| {
                OrchestrationError::InvalidState {
                    batch_id: batch_id.to_string(),
                    reason: "cannot resume: batch is not active".to_string(),
                }
            })?;

            if !runtime.paused {
                return Err(OrchestrationError::InvalidState {
                    batch_id: batch_id.to_string(),
                    reason: "cannot resume: batch is not paused".to_string(),
                });
            }

            runtime.paused = false;
            runtime.resume.notify_waiters();
        }

        debug!("Batch {} resumed", batch_id);
        self.event_bus.publish(DomainEvent::BatchResumed {
            batch_id: batch_id.to_string(),
        });
        Ok(())
    }

    /// Cancel a batch. Idempotent; takes effect at the next checkpoint
    /// and fires the batch's cancel token for in-flight LLM calls.
    pub fn cancel(&self, batch_id: &str) {
        let publish = {
            let mut batches = self.batches.lock();
            match batches.get_mut(batch_id) {
                Some(runtime) => {
                    let first = !runtime.cancel_event_published;
                    runtime.cancel_event_published = true;
                    runtime.cancel.fire();
                    runtime.paused = false;
                    runtime.resume.notify_waiters();
                    first
                }
                None => false,
            }
        };

        if publish {
            debug!("Batch {} cancelled", batch_id);
            self.event_bus.publish(DomainEvent::BatchCancelled {
                batch_id: batch_id.to_string(),
            });
        }
    }

    /// Whether cancellation has been requested for a batch
    pub fn is_cancelled(&self, batch_id: &str) -> bool {
        self.batches
            .lock()
            .get(batch_id)
            .map(|r| r.cancel.is_cancelled())
            .unwrap_or(false)
    }

    /// The cancel token to hand to LLM calls for this batch
    pub fn cancel_token(&self, batch_id: &str) -> CancelToken {
        self.batches
            .lock()
            .get(batch_id)
            .map(|r| r.cancel.clone())
            .unwrap_or_default()
    }

    /// Ids of all currently registered batches
    pub fn active_batch_ids(&self) -> Vec<String> {
        self.batches.lock().keys().cloned().collect()
    }

    /// Suspend until the batch is not paused; raise `Cancelled` if the
    /// batch was cancelled before or during the wait.
    ///
    /// This is the only place pause and cancel are observed.
    pub async fn await_checkpoint(&self, batch_id: &str) -> Result<(), OrchestrationError> {
        loop {
            let (cancel, paused, resume) = {
                let batches = self.batches.lock();
                match batches.get(batch_id) {
                    Some(runtime) => (
                        runtime.cancel.clone(),
                        runtime.paused,
                        runtime.resume.clone(),
                    ),
                    // A missing runtime means the batch was cleaned up
                    // underneath us; treat as cancelled.
                    None => {
                        warn!("Checkpoint for unknown batch {}", batch_id);
                        return Err(OrchestrationError::Cancelled(batch_id.to_string()));
                    }
                }
            };

            if cancel.is_cancelled() {
                return Err(OrchestrationError::Cancelled(batch_id.to_string()));
            }
            if !paused {
                return Ok(());
            }

            // Register for the resume signal before re-checking the
            // pause flag so a concurrent resume cannot be missed.
            let notified = resume.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let still_paused = self
                .batches
                .lock()
                .get(batch_id)
                .map(|r| r.paused)
                .unwrap_or(false);
            if !still_paused {
                continue;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => {
                    return Err(OrchestrationError::Cancelled(batch_id.to_string()));
                }
            }
        }
    }

    /// Remove all state for a batch and close its channel
    pub fn cleanup(&self, batch_id: &str) {
        let removed = self.batches.lock().remove(batch_id);
        if removed.is_some() {
            debug!("Cleaned up state for batch {}", batch_id);
        }
    }
}
