/*!
 * Table definitions for the translation stores.
 *
 * The schema number is kept in SQLite's `user_version` pragma rather
 * than a bookkeeping table. A database stamped with an unknown number
 * is refused outright: downgrades are never safe, and upgrades get an
 * explicit migration step here when a second schema version exists.
 */

use std::cmp::Ordering;

use anyhow::{Context, Result, bail};
use log::{debug, info};
use rusqlite::Connection;

/// Schema number stamped into `user_version`
pub const SCHEMA_VERSION: i32 = 1;

/// Bring a freshly opened connection up to the current schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let found = stored_version(conn)?;

    match found.cmp(&SCHEMA_VERSION) {
        Ordering::Equal => {
            debug!("Database schema is current (v{})", found);
            Ok(())
        }
        Ordering::Less if found == 0 => {
            info!("Creating database schema v{}", SCHEMA_VERSION);
            create_tables(conn)?;
            stamp_version(conn, SCHEMA_VERSION)
        }
        Ordering::Less => {
            bail!(
                "database schema v{} has no upgrade path to v{}",
                found,
                SCHEMA_VERSION
            );
        }
        Ordering::Greater => {
            bail!(
                "database schema v{} is newer than this build supports (v{})",
                found,
                SCHEMA_VERSION
            );
        }
    }
}

fn stored_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("cannot read database schema version")
}

fn stamp_version(conn: &Connection, version: i32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)
        .context("cannot stamp database schema version")
}

fn create_tables(conn: &Connection) -> Result<()> {
    // WAL keeps readers responsive while a write transaction runs.
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    // One row per (unit, project language); upserted, never deleted.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS translation_versions (
            id TEXT PRIMARY KEY,
            unit_id TEXT NOT NULL,
            project_language_id TEXT NOT NULL,
            translated_text TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            confidence_score REAL,
            translation_source TEXT NOT NULL DEFAULT 'unknown',
            validation_issues TEXT,
            is_manually_edited INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(unit_id, project_language_id)
        );

        CREATE INDEX IF NOT EXISTS idx_versions_unit ON translation_versions(unit_id);
        CREATE INDEX IF NOT EXISTS idx_versions_language ON translation_versions(project_language_id);
        CREATE INDEX IF NOT EXISTS idx_versions_status ON translation_versions(status);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS version_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            unit_id TEXT NOT NULL,
            project_language_id TEXT NOT NULL,
            changed_by TEXT NOT NULL,
            reason TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_history_unit ON version_history(unit_id, project_language_id);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tm_entries (
            id TEXT PRIMARY KEY,
            source_text TEXT NOT NULL,
            target_text TEXT NOT NULL,
            target_language TEXT NOT NULL,
            category TEXT,
            quality REAL NOT NULL DEFAULT 1.0,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(source_text, target_language)
        );

        CREATE INDEX IF NOT EXISTS idx_tm_lookup ON tm_entries(source_text, target_language);
        CREATE INDEX IF NOT EXISTS idx_tm_language ON tm_entries(target_language);
        "#,
    )?;

    Ok(())
}
