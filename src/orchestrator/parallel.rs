/*!
 * Parallel batch scheduling.
 *
 * Runs up to N batches concurrently (default 3, clamped to 1..=20) with
 * an explicit FIFO slot queue: a batch that cannot start immediately
 * parks a completer and is released in arrival order as running batches
 * finish. All batch streams are merged into one channel; when the
 * consumer drops the merged stream, the queue is closed, every waiter
 * is released, and active batches are cancelled (observed at their next
 * checkpoint).
 */

use std::collections::VecDeque;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use log::debug;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::config::SchedulerConfig;
use crate::domain::{TranslationContext, TranslationProgress, TranslationUnit};
use crate::errors::OrchestrationError;

use super::batch::BatchOrchestrator;

/// Capacity of the merged stream channel
const MERGED_CHANNEL_CAPACITY: usize = 512;

struct SlotQueue {
    available: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
    closed: bool,
}

impl SlotQueue {
    fn new(slots: usize) -> Self {
        Self {
            available: slots,
            waiters: VecDeque::new(),
            closed: false,
        }
    }
}

/// Composes N concurrent batch pipelines under a bounded limit
pub struct ParallelBatchHandler {
    orchestrator: Arc<BatchOrchestrator>,
    max_concurrent: usize,
}

impl ParallelBatchHandler {
    /// Create a handler running at most the configured number of
    /// batches concurrently
    pub fn new(orchestrator: Arc<BatchOrchestrator>, config: &SchedulerConfig) -> Self {
        Self {
            orchestrator,
            max_concurrent: config.effective_concurrency(),
        }
    }

    /// Start every batch, respecting the concurrency limit, and merge
    /// their progress into one stream keyed by `batch_id`.
    pub fn translate_batches(
        &self,
        batches: Vec<(Vec<TranslationUnit>, TranslationContext)>,
    ) -> impl Stream<Item = Result<TranslationProgress, OrchestrationError>> + Send + use<> {
        let (tx, rx) = mpsc::channel::<Result<TranslationProgress, OrchestrationError>>(
            MERGED_CHANNEL_CAPACITY,
        );
        let slots = Arc::new(Mutex::new(SlotQueue::new(self.max_concurrent)));

        for (units, context) in batches {
            let orchestrator = self.orchestrator.clone();
            let slots = slots.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                Self::acquire_slot(&slots).await;

                // The consumer may have walked away while we queued.
                if slots.lock().closed {
                    return;
                }

                let (batch_id, stream) = orchestrator.clone().translate_batch(units, context);
                debug!("Scheduler started batch {}", batch_id);

                futures::pin_mut!(stream);
                while let Some(item) = stream.next().await {
                    if tx.send(item).await.is_err() {
                        // Merged stream dropped: cancel this batch and
                        // release everything parked behind us.
                        orchestrator.progress().cancel(&batch_id);
                        Self::close(&slots);
                        break;
                    }
                }

                Self::release_slot(&slots);
            });
        }
        drop(tx);

        futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
    }

    /// FIFO slot acquisition: take a free slot or park behind earlier
    /// waiters.
    async fn acquire_slot(slots: &Arc<Mutex<SlotQueue>>) {
        let waiter = {
            let mut queue = slots.lock();
            if queue.closed || queue.available > 0 {
                if queue.available > 0 {
                    queue.available -= 1;
                }
                None
            } else {
                let (tx, rx) = oneshot::channel();
                queue.waiters.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = waiter {
            // A dropped sender only happens at close, which also means
            // the slot is moot.
            let _ = rx.await;
        }
    }

    /// Hand the slot to the oldest waiter, or return it to the pool
    fn release_slot(slots: &Arc<Mutex<SlotQueue>>) {
        let mut queue = slots.lock();
        if let Some(waiter) = queue.waiters.pop_front() {
            let _ = waiter.send(());
        } else {
            queue.available += 1;
        }
    }

    /// Close the queue and release every waiter
    fn close(slots: &Arc<Mutex<SlotQueue>>) {
        let mut queue = slots.lock();
        queue.closed = true;
        while let Some(waiter) = queue.waiters.pop_front() {
            let _ = waiter.send(());
        }
    }
}
