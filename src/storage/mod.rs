/*!
 * SQLite reference implementation of the persistence contracts.
 *
 * The orchestration core only ever sees the service traits; this module
 * provides one injectable implementation backed by SQLite:
 *
 * - `connection`: connection management and async-safe access
 * - `schema`: table definitions and migrations
 * - `repository`: the version repository, TM service, and transaction
 *   manager over one store
 */

pub mod connection;
pub mod repository;
pub mod schema;

pub use connection::StorageConnection;
pub use repository::SqliteStore;
