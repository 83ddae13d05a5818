//! Generated content registry
//!
//! Journals and periodic reports are stored here once generated. The
//! orchestrator consults these tables for its "already exists today"
//! gates so a crashed or re-run cycle never regenerates finished content.

use rusqlite::{OptionalExtension, params};

use crate::db::Datastore;
use crate::error::Result;
use crate::now_ts;

impl Datastore {
    /// Store (or overwrite) the journal for a date (`YYYY-MM-DD`).
    pub fn save_journal(&self, date: &str, content: &str, ai_enabled: bool) -> Result<()> {
        let ts = now_ts();
        self.conn().execute(
            "INSERT INTO journals (date, content, ai_enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(date) DO UPDATE SET
                 content = excluded.content,
                 ai_enabled = excluded.ai_enabled,
                 updated_at = excluded.updated_at",
            params![date, content, ai_enabled as i64, ts],
        )?;
        Ok(())
    }

    /// Whether a journal exists for the date.
    pub fn has_journal_for_date(&self, date: &str) -> Result<bool> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM journals WHERE date = ?1",
            params![date],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// The most recent journal as (date, content).
    pub fn latest_journal(&self) -> Result<Option<(String, String)>> {
        let row = self
            .conn()
            .query_row(
                "SELECT date, content FROM journals ORDER BY date DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Store a periodic report. `period` identifies the slot, e.g.
    /// `2026-W31`, `2026-08` or `2026`.
    pub fn save_report(&self, report_type: &str, period: &str, content: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO reports (report_type, period, content, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(report_type, period) DO UPDATE SET
                 content = excluded.content",
            params![report_type, period, content, now_ts()],
        )?;
        Ok(())
    }

    /// Whether a report exists for the (type, period) slot.
    pub fn has_report(&self, report_type: &str, period: &str) -> Result<bool> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM reports WHERE report_type = ?1 AND period = ?2",
            params![report_type, period],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }
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
    fn test_journal_exists_gate() {
        let (_dir, store) = open_temp();

        assert!(!store.has_journal_for_date("2026-08-01").unwrap());
        store.save_journal("2026-08-01", "body", true).unwrap();
        assert!(store.has_journal_for_date("2026-08-01").unwrap());

        // Overwrite keeps a single row.
        store.save_journal("2026-08-01", "body v2", false).unwrap();
        let (date, content) = store.latest_journal().unwrap().unwrap();
        assert_eq!(date, "2026-08-01");
        assert_eq!(content, "body v2");
    }

    #[test]
    fn test_report_slot_gate() {
        let (_dir, store) = open_temp();

        assert!(!store.has_report("weekly", "2026-W31").unwrap());
        store.save_report("weekly", "2026-W31", "weekly body").unwrap();
        assert!(store.has_report("weekly", "2026-W31").unwrap());
        // Different period is a separate slot.
        assert!(!store.has_report("weekly", "2026-W32").unwrap());
        // Different type is a separate slot.
        assert!(!store.has_report("monthly", "2026-W31").unwrap());
    }
}
