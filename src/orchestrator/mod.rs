/*!
 * Batch orchestration.
 *
 * - `batch`: the single-batch pipeline (TM -> prompt -> LLM ->
 *   validation/persistence) and its progress stream
 * - `parallel`: the N-concurrent batch scheduler with a merged stream
 */

pub mod batch;
pub mod parallel;

pub use batch::{BatchOrchestrator, OrchestratorServices};
pub use parallel::ParallelBatchHandler;
