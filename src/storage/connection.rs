/*!
 * SQLite access for the translation stores.
 *
 * One connection serves the whole store, guarded by a mutex and handed
 * to blocking closures on tokio's blocking pool. There is deliberately
 * a single async entry point (`run`): multi-statement writes open their
 * own rusqlite transaction inside the closure, so the repository layer
 * decides transaction boundaries, not this wrapper.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;

use super::schema;

/// Database file, relative to the user's local data directory
const DB_RELATIVE_PATH: &str = "modtrans/modtrans.db";

/// Shared handle to the store's SQLite connection
#[derive(Clone)]
pub struct StorageConnection {
    conn: Arc<Mutex<Connection>>,
    location: PathBuf,
}

impl StorageConnection {
    /// Open (or create) the database file at `location`, initializing
    /// the schema on first contact.
    pub fn open<P: AsRef<Path>>(location: P) -> Result<Self> {
        let location = location.as_ref().to_path_buf();

        if let Some(dir) = location.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create database directory {}", dir.display()))?;
        }

        let conn = Connection::open(&location)
            .with_context(|| format!("cannot open database {}", location.display()))?;
        info!("Translation database at {}", location.display());

        Self::from_connection(conn, location)
    }

    /// Open the database at its standard per-user location
    pub fn open_default() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .context("no data directory available for the translation database")?;

        Self::open(data_dir.join(DB_RELATIVE_PATH))
    }

    /// Open a throwaway in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("cannot open in-memory database")?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, location: PathBuf) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    /// Where this database lives on disk
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Run a database job on the blocking pool.
    ///
    /// The job receives the connection mutably; open a
    /// `conn.transaction()` inside the closure when several statements
    /// must land atomically.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            job(&mut guard)
        })
        .await
        .context("database job panicked")?
    }

    /// Run a database job synchronously on the calling thread.
    ///
    /// For startup queries and tests; async code paths go through
    /// `run`.
    pub fn with<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock();
        job(&guard)
    }
}
