//! Sanitizer audit trail
//!
//! Append-only record of corrections applied by the output sanitizer.
//! The hourly total backs a runaway-sanitizer guard in the orchestrator.

use rusqlite::params;

use crate::db::Datastore;
use crate::error::Result;
use crate::{now, now_ts, to_ts};

impl Datastore {
    /// Append one sanitizer audit row. Returns the row id.
    pub fn record_sanitizer_audit(&self, task_id: Option<i64>, corrections: i64, notes: Option<&str>) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO sanitizer_audit (task_id, corrections, notes, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![task_id, corrections, notes, now_ts()],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Total corrections recorded within the last `hours`.
    pub fn recent_sanitizer_total(&self, hours: u32) -> Result<i64> {
        let cutoff = to_ts(&(now() - chrono::Duration::hours(hours as i64)));
        let total: Option<i64> = self.conn().query_row(
            "SELECT SUM(corrections) FROM sanitizer_audit WHERE created_at >= ?1",
            params![cutoff],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }
}
