//! Append-only task execution log
//!
//! The log append must survive transient lock contention: a busy writer
//! elsewhere must not lose the record of an execution that already
//! happened. Appends retry with exponential backoff before giving up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rusqlite::params;
use tracing::{error, warn};

use crate::db::Datastore;
use crate::error::Result;
use crate::{now, now_ts, to_ts};

/// Maximum append attempts before the error propagates.
const MAX_LOG_RETRIES: u32 = 5;
/// First backoff; doubles up to [`LOG_BACKOFF_CEILING`].
const LOG_BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const LOG_BACKOFF_CEILING: Duration = Duration::from_secs(5);

/// Count of transient-error retries performed by log appends, for
/// observability.
pub static LOG_RETRIES_TOTAL: AtomicU64 = AtomicU64::new(0);

/// One row of the execution log
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub id: i64,
    pub action_id: String,
    pub success: bool,
    pub result_data: Option<String>,
    pub execution_time_ms: f64,
    pub error_message: Option<String>,
    pub artifacts: Option<String>,
    pub executed_at: String,
}

/// Outcome fields for [`Datastore::log_execution`]
#[derive(Debug, Clone, Default)]
pub struct ExecutionEntry<'a> {
    pub success: bool,
    pub result_data: Option<&'a str>,
    pub execution_time_ms: f64,
    pub error_message: Option<&'a str>,
    pub artifacts: Option<&'a str>,
}

impl Datastore {
    /// Append an execution record, retrying transient storage errors.
    pub fn log_execution(&self, action_id: &str, entry: &ExecutionEntry<'_>) -> Result<()> {
        let mut backoff = LOG_BACKOFF_INITIAL;
        let mut attempt = 0u32;

        loop {
            let outcome = self
                .conn()
                .execute(
                    "INSERT INTO task_execution_log
                         (action_id, success, result_data, execution_time_ms,
                          error_message, artifacts, executed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        action_id,
                        entry.success as i64,
                        entry.result_data,
                        entry.execution_time_ms,
                        entry.error_message,
                        entry.artifacts,
                        now_ts(),
                    ],
                )
                .map_err(crate::error::StoreError::from);

            match outcome {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() && attempt < MAX_LOG_RETRIES => {
                    attempt += 1;
                    LOG_RETRIES_TOTAL.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        action_id,
                        attempt,
                        error = %e,
                        "Transient error appending execution log, retrying in {:?}",
                        backoff
                    );
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(LOG_BACKOFF_CEILING);
                }
                Err(e) => {
                    error!(action_id, error = %e, "Failed to append execution log");
                    return Err(e);
                }
            }
        }
    }

    /// Execution history for the last `days`, optionally filtered to one
    /// action, newest first.
    pub fn execution_history(&self, action_id: Option<&str>, days: u32) -> Result<Vec<ExecutionRecord>> {
        let cutoff = to_ts(&(now() - chrono::Duration::days(days as i64)));

        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<ExecutionRecord> {
            Ok(ExecutionRecord {
                id: row.get(0)?,
                action_id: row.get(1)?,
                success: row.get::<_, i64>(2)? != 0,
                result_data: row.get(3)?,
                execution_time_ms: row.get(4)?,
                error_message: row.get(5)?,
                artifacts: row.get(6)?,
                executed_at: row.get(7)?,
            })
        };

        let records = match action_id {
            Some(id) => {
                let mut stmt = self.conn().prepare(
                    "SELECT id, action_id, success, result_data, execution_time_ms,
                            error_message, artifacts, executed_at
                     FROM task_execution_log
                     WHERE action_id = ?1 AND executed_at >= ?2
                     ORDER BY executed_at DESC",
                )?;
                let rows = stmt.query_map(params![id, cutoff], map)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = self.conn().prepare(
                    "SELECT id, action_id, success, result_data, execution_time_ms,
                            error_message, artifacts, executed_at
                     FROM task_execution_log
                     WHERE executed_at >= ?1
                     ORDER BY executed_at DESC",
                )?;
                let rows = stmt.query_map(params![cutoff], map)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::NewTask;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Datastore) {
        let dir = TempDir::new().unwrap();
        let store = Datastore::open(dir.path().join("store.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_log_and_history() {
        let (_dir, store) = open_temp();
        store.enqueue(&NewTask::new("ACT-L", "research", "l")).unwrap();

        store
            .log_execution(
                "ACT-L",
                &ExecutionEntry {
                    success: true,
                    result_data: Some("wrote artifact"),
                    execution_time_ms: 42.5,
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .log_execution(
                "ACT-L",
                &ExecutionEntry {
                    success: false,
                    error_message: Some("boom"),
                    ..Default::default()
                },
            )
            .unwrap();

        let all = store.execution_history(None, 7).unwrap();
        assert_eq!(all.len(), 2);

        let for_task = store.execution_history(Some("ACT-L"), 7).unwrap();
        assert_eq!(for_task.len(), 2);
        // Newest first.
        assert!(!for_task[0].success);
        assert!(for_task[1].success);

        let other = store.execution_history(Some("ACT-OTHER"), 7).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_history_respects_day_cutoff() {
        let (_dir, store) = open_temp();
        store
            .log_execution("ACT-OLD", &ExecutionEntry { success: true, ..Default::default() })
            .unwrap();

        // Backdate the row past the window.
        let old = to_ts(&(now() - chrono::Duration::days(10)));
        store
            .conn()
            .execute("UPDATE task_execution_log SET executed_at = ?1", params![old])
            .unwrap();

        assert!(store.execution_history(None, 7).unwrap().is_empty());
        assert_eq!(store.execution_history(None, 30).unwrap().len(), 1);
    }
}
