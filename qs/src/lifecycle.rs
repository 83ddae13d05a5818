//! Document lifecycle registry
//!
//! Tracks every generated document from draft through publication.
//! Status only moves forward through the order draft < in_progress <
//! review < published < archived; the single sanctioned rewind is
//! [`Datastore::mark_for_update`], which sends a published document back
//! to in_progress for re-publication.
//!
//! Paths are normalized (absolute, symlinks resolved where the file
//! exists) at the API boundary so relative and absolute spellings of the
//! same file share one record.

use std::path::{Path, PathBuf};

use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use crate::db::Datastore;
use crate::error::Result;
use crate::{now, now_ts, to_ts};

/// Publication-readiness stage of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    #[default]
    Draft,
    InProgress,
    Review,
    Published,
    Archived,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for DocStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DocStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Unknown document status: {}", s)),
        }
    }
}

/// One lifecycle row
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleRecord {
    pub file_path: String,
    pub doc_type: String,
    pub status: DocStatus,
    pub content_hash: Option<String>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
    pub published_at: Option<String>,
    pub remote_id: Option<String>,
    pub retry_count: i64,
    pub last_error: Option<String>,
}

/// Resolve a path to its canonical absolute form.
///
/// Symlinks are resolved when the file exists; a not-yet-written path is
/// made absolute lexically so it still lands on the same record once the
/// file appears.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn path_key(path: impl AsRef<Path>) -> String {
    normalize_path(path).to_string_lossy().into_owned()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<LifecycleRecord> {
    let status: String = row.get(2)?;
    Ok(LifecycleRecord {
        file_path: row.get(0)?,
        doc_type: row.get(1)?,
        status: status.parse().unwrap_or_default(),
        content_hash: row.get(3)?,
        version: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        published_at: row.get(7)?,
        remote_id: row.get(8)?,
        retry_count: row.get(9)?,
        last_error: row.get(10)?,
    })
}

const LC_COLUMNS: &str = "file_path, doc_type, status, content_hash, version, \
     created_at, updated_at, published_at, remote_id, retry_count, last_error";

impl Datastore {
    /// Register a document, upserting on its normalized path.
    ///
    /// An existing record keeps the higher of its current and the
    /// requested status; content hash, updated_at and version change only
    /// when the content differs or the status advances, so re-registering
    /// identical content is a no-op.
    pub fn register_document(
        &mut self,
        path: impl AsRef<Path>,
        doc_type: &str,
        status: DocStatus,
        content_hash: Option<&str>,
    ) -> Result<()> {
        let key = path_key(path);
        let ts = now_ts();
        let tx = self.tx()?;

        let existing: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT status, content_hash FROM document_lifecycle WHERE file_path = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((existing_status, existing_hash)) => {
                let existing_status: DocStatus = existing_status.parse().unwrap_or_default();
                let effective = status.max(existing_status);

                if content_hash != existing_hash.as_deref() || effective != existing_status {
                    tx.execute(
                        "UPDATE document_lifecycle
                         SET doc_type = ?1, status = ?2, content_hash = ?3,
                             updated_at = ?4, version = version + 1
                         WHERE file_path = ?5",
                        params![doc_type, effective.as_str(), content_hash, ts, key],
                    )?;
                }
            }
            None => {
                tx.execute(
                    "INSERT INTO document_lifecycle
                         (file_path, doc_type, status, content_hash, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![key, doc_type, status.as_str(), content_hash, ts],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Fetch the lifecycle record for a path.
    pub fn document(&self, path: impl AsRef<Path>) -> Result<Option<LifecycleRecord>> {
        let record = self
            .conn()
            .query_row(
                &format!("SELECT {LC_COLUMNS} FROM document_lifecycle WHERE file_path = ?1"),
                params![path_key(path)],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Set a document's status, bumping the version and stamping
    /// published_at the first time the document reaches published.
    pub fn update_document_status(
        &self,
        path: impl AsRef<Path>,
        status: DocStatus,
        remote_id: Option<&str>,
    ) -> Result<bool> {
        let ts = now_ts();
        let published_at = (status == DocStatus::Published).then(|| ts.clone());
        let n = self.conn().execute(
            "UPDATE document_lifecycle
             SET status = ?1,
                 updated_at = ?2,
                 published_at = COALESCE(published_at, ?3),
                 remote_id = COALESCE(?4, remote_id),
                 version = version + 1
             WHERE file_path = ?5",
            params![status.as_str(), ts, published_at, remote_id, path_key(path)],
        )?;
        Ok(n > 0)
    }

    /// Whether a generator may overwrite the file: unknown to the
    /// registry, or a never-published draft.
    pub fn is_safe_to_overwrite(&self, path: impl AsRef<Path>) -> Result<bool> {
        match self.document(path)? {
            None => Ok(true),
            Some(rec) => Ok(rec.status == DocStatus::Draft && rec.published_at.is_none()),
        }
    }

    /// Send a published document back to in_progress for re-publication.
    /// Only published rows are affected.
    pub fn mark_document_for_update(&self, path: impl AsRef<Path>) -> Result<bool> {
        let n = self.conn().execute(
            "UPDATE document_lifecycle
             SET status = 'in_progress', updated_at = ?1, version = version + 1
             WHERE file_path = ?2
               AND status = 'published'",
            params![now_ts(), path_key(path)],
        )?;
        Ok(n > 0)
    }

    /// Advisory recovery: in_progress documents untouched for
    /// `ttl_seconds` drop back to draft. Returns the number released.
    pub fn release_stale_doc_claims(&self, ttl_seconds: u64) -> Result<usize> {
        let cutoff = to_ts(&(now() - chrono::Duration::seconds(ttl_seconds as i64)));
        let n = self.conn().execute(
            "UPDATE document_lifecycle
             SET status = 'draft', updated_at = ?1, version = version + 1
             WHERE status = 'in_progress'
               AND updated_at < ?2",
            params![now_ts(), cutoff],
        )?;
        Ok(n)
    }

    /// All documents currently at `status`, most recently touched first.
    pub fn documents_by_status(&self, status: DocStatus) -> Result<Vec<LifecycleRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {LC_COLUMNS} FROM document_lifecycle
             WHERE status = ?1
             ORDER BY updated_at DESC"
        ))?;
        let records = stmt
            .query_map(params![status.as_str()], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Documents that have not reached the remote yet, in_progress first.
    pub fn unpublished_documents(&self) -> Result<Vec<LifecycleRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {LC_COLUMNS} FROM document_lifecycle
             WHERE status != 'published' OR remote_id IS NULL
             ORDER BY
                 CASE status WHEN 'in_progress' THEN 1 WHEN 'draft' THEN 2 ELSE 3 END,
                 updated_at DESC"
        ))?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Candidates for the publish retry worker: not yet published,
    /// fewest prior attempts first.
    pub fn publish_retry_candidates(&self, limit: usize) -> Result<Vec<LifecycleRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {LC_COLUMNS} FROM document_lifecycle
             WHERE status != 'published'
             ORDER BY retry_count ASC, updated_at ASC
             LIMIT ?1"
        ))?;
        let records = stmt
            .query_map(params![limit as i64], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Record a failed publish attempt against a document.
    pub fn bump_publish_retry(&self, path: impl AsRef<Path>, error: &str) -> Result<bool> {
        let n = self.conn().execute(
            "UPDATE document_lifecycle
             SET retry_count = retry_count + 1, last_error = ?1, updated_at = ?2
             WHERE file_path = ?3",
            params![error, now_ts(), path_key(path)],
        )?;
        Ok(n > 0)
    }
}
