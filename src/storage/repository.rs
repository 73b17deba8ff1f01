/*!
 * SQLite-backed implementation of the persistence contracts.
 *
 * One store implements the translation-version repository, the
 * translation-memory service, and the transaction manager, all over the
 * same connection. Fuzzy TM matching pulls candidates by language and
 * scores them in process with normalized Levenshtein similarity.
 */

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::domain::{TmMatch, TmMatchType, TranslationSource, TranslationVersion, VersionStatus};
use crate::services::{
    TransactionManager, TranslationMemoryService, TranslationVersionRepository, WriteOp,
};
use crate::tm::similarity::similarity;

use super::connection::StorageConnection;

/// Candidate rows pulled per fuzzy query before in-process scoring
const FUZZY_CANDIDATE_LIMIT: usize = 500;

/// SQLite store implementing the persistence service traits
#[derive(Clone)]
pub struct SqliteStore {
    db: StorageConnection,
}

impl SqliteStore {
    /// Create a store over an open connection
    pub fn new(db: StorageConnection) -> Self {
        Self { db }
    }

    /// Create a store at the default database location
    pub fn new_default() -> Result<Self> {
        Ok(Self::new(StorageConnection::open_default()?))
    }

    /// Create a store over an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(StorageConnection::open_in_memory()?))
    }

    /// The underlying connection
    pub fn connection(&self) -> &StorageConnection {
        &self.db
    }

    fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<TranslationVersion> {
        Ok(TranslationVersion {
            id: row.get(0)?,
            unit_id: row.get(1)?,
            project_language_id: row.get(2)?,
            translated_text: row.get(3)?,
            status: row
                .get::<_, String>(4)?
                .parse()
                .unwrap_or(VersionStatus::Pending),
            confidence_score: row.get(5)?,
            translation_source: row
                .get::<_, String>(6)?
                .parse()
                .unwrap_or(TranslationSource::Unknown),
            validation_issues: row.get(7)?,
            is_manually_edited: row.get::<_, i64>(8)? != 0,
            created_at: parse_timestamp(&row.get::<_, String>(9)?),
            updated_at: parse_timestamp(&row.get::<_, String>(10)?),
        })
    }

    fn upsert_version_sync(conn: &Connection, version: &TranslationVersion) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO translation_versions (
                id, unit_id, project_language_id, translated_text, status,
                confidence_score, translation_source, validation_issues,
                is_manually_edited, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(unit_id, project_language_id) DO UPDATE SET
                translated_text = excluded.translated_text,
                status = excluded.status,
                confidence_score = excluded.confidence_score,
                translation_source = excluded.translation_source,
                validation_issues = excluded.validation_issues,
                is_manually_edited = excluded.is_manually_edited,
                updated_at = excluded.updated_at
            "#,
            params![
                version.id,
                version.unit_id,
                version.project_language_id,
                version.translated_text,
                version.status.to_string(),
                version.confidence_score,
                version.translation_source.to_string(),
                version.validation_issues,
                version.is_manually_edited as i64,
                version.created_at.to_rfc3339(),
                version.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn record_history_sync(
        conn: &Connection,
        unit_id: &str,
        project_language_id: &str,
        changed_by: &str,
        reason: &str,
    ) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO version_history (unit_id, project_language_id, changed_by, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                unit_id,
                project_language_id,
                changed_by,
                reason,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_VERSION_COLUMNS: &str = r#"
    SELECT id, unit_id, project_language_id, translated_text, status,
           confidence_score, translation_source, validation_issues,
           is_manually_edited, created_at, updated_at
    FROM translation_versions
"#;

#[async_trait]
impl TranslationVersionRepository for SqliteStore {
    async fn get_by_unit(&self, unit_id: &str) -> Result<Vec<TranslationVersion>> {
        let unit_id = unit_id.to_string();

        self.db
            .run(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("{} WHERE unit_id = ?1", SELECT_VERSION_COLUMNS))?;
                let versions = stmt
                    .query_map([&unit_id], Self::row_to_version)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(versions)
            })
            .await
    }

    async fn get_by_unit_and_project_language(
        &self,
        unit_id: &str,
        project_language_id: &str,
    ) -> Result<Option<TranslationVersion>> {
        let unit_id = unit_id.to_string();
        let project_language_id = project_language_id.to_string();

        self.db
            .run(move |conn| {
                let result = conn
                    .query_row(
                        &format!(
                            "{} WHERE unit_id = ?1 AND project_language_id = ?2",
                            SELECT_VERSION_COLUMNS
                        ),
                        params![unit_id, project_language_id],
                        Self::row_to_version,
                    )
                    .optional()?;
                Ok(result)
            })
            .await
    }

    async fn get_translated_unit_ids(
        &self,
        unit_ids: &[String],
        project_language_id: &str,
    ) -> Result<HashSet<String>> {
        if unit_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let unit_ids: Vec<String> = unit_ids.to_vec();
        let project_language_id = project_language_id.to_string();

        self.db
            .run(move |conn| {
                let placeholders = vec!["?"; unit_ids.len()].join(", ");
                let sql = format!(
                    "SELECT unit_id FROM translation_versions
                     WHERE project_language_id = ? AND translated_text IS NOT NULL
                       AND unit_id IN ({})",
                    placeholders
                );

                let mut stmt = conn.prepare(&sql)?;
                let mut bindings: Vec<&dyn rusqlite::ToSql> = vec![&project_language_id];
                for id in &unit_ids {
                    bindings.push(id);
                }

                let ids = stmt
                    .query_map(&bindings[..], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<HashSet<_>>>()?;
                Ok(ids)
            })
            .await
    }

    async fn insert(&self, version: &TranslationVersion) -> Result<()> {
        let version = version.clone();

        self.db
            .run(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO translation_versions (
                        id, unit_id, project_language_id, translated_text, status,
                        confidence_score, translation_source, validation_issues,
                        is_manually_edited, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    "#,
                    params![
                        version.id,
                        version.unit_id,
                        version.project_language_id,
                        version.translated_text,
                        version.status.to_string(),
                        version.confidence_score,
                        version.translation_source.to_string(),
                        version.validation_issues,
                        version.is_manually_edited as i64,
                        version.created_at.to_rfc3339(),
                        version.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn update(&self, version: &TranslationVersion) -> Result<()> {
        let version = version.clone();

        self.db
            .run(move |conn| {
                let changed = conn.execute(
                    r#"
                    UPDATE translation_versions SET
                        translated_text = ?3, status = ?4, confidence_score = ?5,
                        translation_source = ?6, validation_issues = ?7,
                        is_manually_edited = ?8, updated_at = ?9
                    WHERE unit_id = ?1 AND project_language_id = ?2
                    "#,
                    params![
                        version.unit_id,
                        version.project_language_id,
                        version.translated_text,
                        version.status.to_string(),
                        version.confidence_score,
                        version.translation_source.to_string(),
                        version.validation_issues,
                        version.is_manually_edited as i64,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                if changed == 0 {
                    return Err(anyhow::anyhow!(
                        "No version for unit {} in language {}",
                        version.unit_id,
                        version.project_language_id
                    ));
                }
                Ok(())
            })
            .await
    }

    async fn upsert(&self, version: &TranslationVersion) -> Result<()> {
        let version = version.clone();

        self.db
            .run(move |conn| Self::upsert_version_sync(conn, &version))
            .await
    }
}

#[async_trait]
impl TranslationMemoryService for SqliteStore {
    async fn find_exact_match(
        &self,
        source_text: &str,
        target_language: &str,
    ) -> Result<Option<TmMatch>> {
        let source_text = source_text.to_string();
        let target_language = target_language.to_string();

        self.db
            .run(move |conn| {
                let result = conn
                    .query_row(
                        "SELECT id, target_text, quality FROM tm_entries
                         WHERE source_text = ?1 AND target_language = ?2",
                        params![source_text, target_language],
                        |row| {
                            Ok(TmMatch {
                                entry_id: row.get(0)?,
                                target_text: row.get(1)?,
                                similarity_score: 1.0,
                                quality_score: row.get(2)?,
                                match_type: TmMatchType::Exact,
                            })
                        },
                    )
                    .optional()?;
                Ok(result)
            })
            .await
    }

    async fn find_fuzzy_matches(
        &self,
        source_text: &str,
        target_language: &str,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<TmMatch>> {
        let source_text = source_text.to_string();
        let target_language = target_language.to_string();

        self.db
            .run(move |conn| {
                // Pull the most-used candidates for the language and
                // score them here; SQLite has no similarity function.
                let mut stmt = conn.prepare(
                    "SELECT id, source_text, target_text, quality FROM tm_entries
                     WHERE target_language = ?1
                     ORDER BY usage_count DESC, updated_at DESC
                     LIMIT ?2",
                )?;

                let candidates = stmt
                    .query_map(params![target_language, FUZZY_CANDIDATE_LIMIT as i64], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, f64>(3)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let mut matches: Vec<TmMatch> = candidates
                    .into_iter()
                    .filter_map(|(id, candidate_source, target_text, quality)| {
                        let score = similarity(&source_text, &candidate_source);
                        if score >= min_similarity && score < 1.0 {
                            Some(TmMatch {
                                entry_id: id,
                                target_text,
                                similarity_score: score,
                                quality_score: score * quality,
                                match_type: TmMatchType::Fuzzy,
                            })
                        } else {
                            None
                        }
                    })
                    .collect();

                matches.sort_by(|a, b| {
                    b.similarity_score
                        .partial_cmp(&a.similarity_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                matches.truncate(limit);

                debug!(
                    "Fuzzy lookup found {} matches above {:.2}",
                    matches.len(),
                    min_similarity
                );
                Ok(matches)
            })
            .await
    }

    async fn add_translation(
        &self,
        source_text: &str,
        target_text: &str,
        target_language: &str,
        category: Option<&str>,
        quality: f64,
    ) -> Result<()> {
        let source_text = source_text.to_string();
        let target_text = target_text.to_string();
        let target_language = target_language.to_string();
        let category = category.map(|c| c.to_string());

        self.db
            .run(move |conn| {
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    r#"
                    INSERT INTO tm_entries (
                        id, source_text, target_text, target_language, category,
                        quality, usage_count, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)
                    ON CONFLICT(source_text, target_language) DO UPDATE SET
                        target_text = excluded.target_text,
                        category = excluded.category,
                        quality = excluded.quality,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        Uuid::new_v4().to_string(),
                        source_text,
                        target_text,
                        target_language,
                        category,
                        quality,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn increment_usage_count(&self, entry_id: &str) -> Result<()> {
        let entry_id = entry_id.to_string();

        self.db
            .run(move |conn| {
                conn.execute(
                    "UPDATE tm_entries SET usage_count = usage_count + 1 WHERE id = ?1",
                    [&entry_id],
                )?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl TransactionManager for SqliteStore {
    async fn execute_transaction(&self, ops: Vec<WriteOp>) -> Result<()> {
        self.db
            .run(move |conn| {
                let tx = conn.transaction()?;
                for op in &ops {
                    match op {
                        WriteOp::UpsertVersion(version) => {
                            SqliteStore::upsert_version_sync(&tx, version)?;
                        }
                        WriteOp::RecordHistory {
                            unit_id,
                            project_language_id,
                            changed_by,
                            reason,
                        } => {
                            SqliteStore::record_history_sync(
                                &tx,
                                unit_id,
                                project_language_id,
                                changed_by,
                                reason,
                            )?;
                        }
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }
}
