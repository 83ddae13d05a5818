//! Publish records
//!
//! One row per file that has reached the remote target, keyed by the
//! normalized path and carrying the content fingerprint stored at the
//! last successful publish. A file whose current fingerprint matches the
//! stored one is already synced and must not trigger another remote call.

use std::path::Path;

use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;

use crate::db::Datastore;
use crate::error::Result;
use crate::lifecycle::{DocStatus, normalize_path};
use crate::now_ts;

/// One publish record
#[derive(Debug, Clone, Serialize)]
pub struct PublishRecord {
    pub file_path: String,
    pub file_hash: String,
    pub remote_id: String,
    pub remote_url: Option<String>,
    pub doc_type: Option<String>,
    pub synced_at: String,
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PublishRecord> {
    Ok(PublishRecord {
        file_path: row.get(0)?,
        file_hash: row.get(1)?,
        remote_id: row.get(2)?,
        remote_url: row.get(3)?,
        doc_type: row.get(4)?,
        synced_at: row.get(5)?,
    })
}

fn path_key(path: impl AsRef<Path>) -> String {
    normalize_path(path).to_string_lossy().into_owned()
}

impl Datastore {
    /// Record a successful publish and promote the document's lifecycle
    /// row to published in the same transaction.
    pub fn record_sync(
        &mut self,
        path: impl AsRef<Path>,
        file_hash: &str,
        remote_id: &str,
        remote_url: Option<&str>,
        doc_type: Option<&str>,
    ) -> Result<()> {
        let key = path_key(path);
        let ts = now_ts();
        let tx = self.tx()?;

        tx.execute(
            "INSERT INTO publish_sync (file_path, file_hash, remote_id, remote_url, doc_type, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(file_path) DO UPDATE SET
                 file_hash = excluded.file_hash,
                 remote_id = excluded.remote_id,
                 remote_url = excluded.remote_url,
                 doc_type = excluded.doc_type,
                 synced_at = excluded.synced_at",
            params![key, file_hash, remote_id, remote_url, doc_type, ts],
        )?;

        tx.execute(
            "UPDATE document_lifecycle
             SET status = ?1,
                 remote_id = ?2,
                 published_at = COALESCE(published_at, ?3),
                 content_hash = ?4,
                 updated_at = ?3,
                 version = version + 1
             WHERE file_path = ?5",
            params![DocStatus::Published.as_str(), remote_id, ts, file_hash, key],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Fetch the publish record for a path.
    pub fn sync_record(&self, path: impl AsRef<Path>) -> Result<Option<PublishRecord>> {
        let record = self
            .conn()
            .query_row(
                "SELECT file_path, file_hash, remote_id, remote_url, doc_type, synced_at
                 FROM publish_sync WHERE file_path = ?1",
                params![path_key(path)],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Whether the file is already published for the given fingerprint.
    pub fn is_synced(&self, path: impl AsRef<Path>, fingerprint: &str) -> Result<bool> {
        Ok(self
            .sync_record(path)?
            .is_some_and(|rec| rec.file_hash == fingerprint))
    }

    /// Drop the publish record for one file, forcing a re-sync.
    pub fn clear_sync(&self, path: impl AsRef<Path>) -> Result<bool> {
        let n = self
            .conn()
            .execute("DELETE FROM publish_sync WHERE file_path = ?1", params![path_key(path)])?;
        Ok(n > 0)
    }

    /// Drop every publish record, forcing a full re-sync.
    pub fn clear_all_syncs(&self) -> Result<usize> {
        Ok(self.conn().execute("DELETE FROM publish_sync", [])?)
    }

    /// Every published file, newest sync first.
    pub fn synced_files(&self) -> Result<Vec<PublishRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT file_path, file_hash, remote_id, remote_url, doc_type, synced_at
             FROM publish_sync ORDER BY synced_at DESC",
        )?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}
