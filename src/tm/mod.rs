/*!
 * Translation-memory lookup pipeline.
 *
 * - `similarity`: normalized Levenshtein similarity used for fuzzy
 *   matching
 * - `lookup`: the exact/fuzzy chunked lookup handler
 */

pub mod lookup;
pub mod similarity;

pub use lookup::{TmLookupHandler, TmLookupOutcome};
