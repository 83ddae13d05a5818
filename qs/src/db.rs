//! Store handle, pragmas, schema and migrations
//!
//! One `Datastore` wraps one SQLite connection. Components and threads
//! each open their own handle against the same file; WAL mode plus a
//! generous busy timeout let concurrent claim attempts queue instead of
//! failing outright. Schema creation is idempotent and runs on every
//! open, followed by additive column migrations that tolerate "duplicate
//! column name" so older store files upgrade in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::now_ts;

/// Busy timeout applied to every connection. Concurrent workers block on
/// the write lock for up to this long before surfacing SQLITE_BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Feature toggles stored in the config table
///
/// Values parse as booleans (true/1/yes/on); a missing key means enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Publishing,
    TaskExecution,
    InsightsExtraction,
}

impl Toggle {
    /// Config-table key for this toggle.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Publishing => "publishing_enabled",
            Self::TaskExecution => "task_execution_enabled",
            Self::InsightsExtraction => "insights_extraction_enabled",
        }
    }
}

/// Handle to the embedded store
pub struct Datastore {
    conn: Connection,
    path: PathBuf,
}

impl Datastore {
    /// Open (creating if needed) the store at `path` and bring the schema
    /// up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;

        // WAL gives concurrent readers with a single writer; NORMAL sync
        // is safe under WAL and avoids an fsync per transaction.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA cache_size = -20000;",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        create_schema(&conn)?;
        migrate(&conn)?;
        crate::schedule::seed_defaults(&conn)?;

        debug!(path = %path.display(), "Datastore opened");
        Ok(Self { conn, path })
    }

    /// Path of the underlying store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a short transaction; commit on success, rollback on drop.
    pub(crate) fn tx(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    // === Config key/value ===

    /// Read a config value.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM system_config WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write a config value, preserving an existing description when none
    /// is supplied.
    pub fn set_config(&self, key: &str, value: &str, description: Option<&str>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO system_config (key, value, description, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 description = COALESCE(excluded.description, system_config.description),
                 updated_at = excluded.updated_at",
            params![key, value, description, now_ts()],
        )?;
        Ok(())
    }

    /// Delete a config key. Returns true if a row was removed.
    pub fn delete_config(&self, key: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM system_config WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    /// All config keys and values.
    pub fn all_config(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM system_config ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // === Feature toggles ===

    /// Whether a feature toggle is enabled (missing key means enabled).
    pub fn is_enabled(&self, toggle: Toggle) -> Result<bool> {
        let value = self.get_config(toggle.key())?.unwrap_or_else(|| "true".to_string());
        Ok(matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
    }

    /// Flip a feature toggle.
    pub fn set_enabled(&self, toggle: Toggle, enabled: bool) -> Result<()> {
        self.set_config(
            toggle.key(),
            if enabled { "true" } else { "false" },
            Some("Feature toggle"),
        )
    }
}

/// Create every table and index. Idempotent.
fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action_id TEXT UNIQUE NOT NULL,
            action_type TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            priority TEXT NOT NULL DEFAULT 'medium',
            status TEXT NOT NULL DEFAULT 'pending',
            source_report TEXT,
            source_context TEXT,
            deadline TEXT,
            scheduled_for TEXT,
            result TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            metadata TEXT
        );

        CREATE TABLE IF NOT EXISTS task_execution_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action_id TEXT NOT NULL,
            success INTEGER NOT NULL,
            result_data TEXT,
            execution_time_ms REAL NOT NULL DEFAULT 0,
            error_message TEXT,
            artifacts TEXT,
            executed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS document_lifecycle (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT UNIQUE NOT NULL,
            doc_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            content_hash TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            published_at TEXT,
            remote_id TEXT,
            metadata TEXT
        );

        CREATE TABLE IF NOT EXISTS publish_sync (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT UNIQUE NOT NULL,
            file_hash TEXT NOT NULL,
            remote_id TEXT NOT NULL,
            remote_url TEXT,
            doc_type TEXT,
            synced_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schedule_tracker (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_name TEXT UNIQUE NOT NULL,
            last_run TEXT,
            next_run TEXT,
            frequency TEXT NOT NULL DEFAULT 'daily',
            enabled INTEGER NOT NULL DEFAULT 1,
            metadata TEXT
        );

        CREATE TABLE IF NOT EXISTS system_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            description TEXT,
            updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS sanitizer_audit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER,
            corrections INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS journals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT UNIQUE NOT NULL,
            content TEXT NOT NULL,
            ai_enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            report_type TEXT NOT NULL,
            period TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(report_type, period)
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_status_created ON tasks(status, created_at);
        CREATE INDEX IF NOT EXISTS idx_tasks_scheduled ON tasks(scheduled_for);
        CREATE INDEX IF NOT EXISTS idx_task_log_action ON task_execution_log(action_id);
        CREATE INDEX IF NOT EXISTS idx_doc_lifecycle_path ON document_lifecycle(file_path);
        CREATE INDEX IF NOT EXISTS idx_doc_lifecycle_status ON document_lifecycle(status);
        CREATE INDEX IF NOT EXISTS idx_publish_sync_path ON publish_sync(file_path);
        CREATE INDEX IF NOT EXISTS idx_schedule_task ON schedule_tracker(task_name);
        "#,
    )?;
    Ok(())
}

/// Additive column migrations for store files created by older versions.
///
/// Each statement is attempted independently; "duplicate column name"
/// means the column is already present and is not an error.
fn migrate(conn: &Connection) -> Result<()> {
    const MIGRATIONS: &[&str] = &[
        "ALTER TABLE document_lifecycle ADD COLUMN retry_count INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE document_lifecycle ADD COLUMN last_error TEXT",
    ];

    for stmt in MIGRATIONS {
        match conn.execute(stmt, []) {
            Ok(_) => info!(statement = stmt, "Applied schema migration"),
            Err(e) if e.to_string().contains("duplicate column name") => {
                debug!(statement = stmt, "Migration already applied");
            }
            Err(e) => return Err(StoreError::Database(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Datastore) {
        let dir = TempDir::new().unwrap();
        let store = Datastore::open(dir.path().join("store.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b").join("store.db");
        let store = Datastore::open(&nested).unwrap();
        assert_eq!(store.path(), nested.as_path());
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        drop(Datastore::open(&path).unwrap());
        // Second open re-runs schema creation and migrations without error.
        drop(Datastore::open(&path).unwrap());
        drop(Datastore::open(&path).unwrap());
    }

    #[test]
    fn test_config_round_trip() {
        let (_dir, store) = open_temp();

        assert_eq!(store.get_config("missing").unwrap(), None);

        store.set_config("k", "v1", Some("a key")).unwrap();
        assert_eq!(store.get_config("k").unwrap().as_deref(), Some("v1"));

        // Overwrite keeps the description when none supplied.
        store.set_config("k", "v2", None).unwrap();
        assert_eq!(store.get_config("k").unwrap().as_deref(), Some("v2"));

        assert!(store.delete_config("k").unwrap());
        assert!(!store.delete_config("k").unwrap());
    }

    #[test]
    fn test_toggles_default_enabled() {
        let (_dir, store) = open_temp();

        assert!(store.is_enabled(Toggle::Publishing).unwrap());
        assert!(store.is_enabled(Toggle::TaskExecution).unwrap());
        assert!(store.is_enabled(Toggle::InsightsExtraction).unwrap());

        store.set_enabled(Toggle::Publishing, false).unwrap();
        assert!(!store.is_enabled(Toggle::Publishing).unwrap());

        store.set_enabled(Toggle::Publishing, true).unwrap();
        assert!(store.is_enabled(Toggle::Publishing).unwrap());
    }

    #[test]
    fn test_toggle_parses_loose_booleans() {
        let (_dir, store) = open_temp();
        for v in ["yes", "1", "on", "TRUE"] {
            store.set_config(Toggle::TaskExecution.key(), v, None).unwrap();
            assert!(store.is_enabled(Toggle::TaskExecution).unwrap(), "value {v}");
        }
        for v in ["no", "0", "off", "false"] {
            store.set_config(Toggle::TaskExecution.key(), v, None).unwrap();
            assert!(!store.is_enabled(Toggle::TaskExecution).unwrap(), "value {v}");
        }
    }
}
