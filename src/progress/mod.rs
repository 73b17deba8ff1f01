/*!
 * Batch runtime state: progress fan-out, pause/resume, cancellation.
 *
 * - `manager`: the authoritative in-memory state of every active batch
 * - `cancel`: the cancellation token handed to LLM calls
 */

pub mod cancel;
pub mod manager;

pub use cancel::CancelToken;
pub use manager::BatchProgressManager;
