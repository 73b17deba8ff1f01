/*!
 * Validation and persistence of produced translations.
 */

pub mod handler;

pub use handler::{PersistOutcome, ValidationPersistenceHandler};
