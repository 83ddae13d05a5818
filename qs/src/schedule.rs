//! Frequency-classed schedule tracker
//!
//! Named periodic tasks record their last run here; `should_run` answers
//! whether the current wall clock falls in a new period. Both the
//! orchestrator (generator gating) and the publisher (weekly/monthly/
//! yearly cadence slots) go through this table, which is what makes
//! periodic work monotonic across processes.

use chrono::{DateTime, Datelike, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::db::Datastore;
use crate::error::Result;
use crate::{now, now_ts, parse_ts};

/// Frequency class of a tracked task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Parse a stored frequency tag; `None` for unknown tags, which the
    /// gate treats as always-due.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    /// Whether a task last run at `last_run` is due again at `now`.
    pub fn is_due(&self, last_run: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Hourly => (now - last_run).num_seconds() >= 3600,
            Self::Daily => now.date_naive() > last_run.date_naive(),
            Self::Weekly => (now - last_run).num_days() >= 7,
            Self::Monthly => (now.year(), now.month()) > (last_run.year(), last_run.month()),
            Self::Yearly => now.year() > last_run.year(),
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One schedule tracker row, as surfaced to operators
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleEntry {
    pub task_name: String,
    pub last_run: Option<String>,
    pub frequency: String,
    pub enabled: bool,
    pub should_run: bool,
}

/// Named tasks seeded on every open. INSERT OR IGNORE keeps
/// re-initialization idempotent.
const DEFAULT_SCHEDULES: &[(&str, &str, &str)] = &[
    ("journal_publish", "daily", "Publish the daily journal"),
    ("remote_sync", "daily", "Sync ready outputs to the remote target"),
    ("insights_extraction", "daily", "Extract action items from reports"),
    ("economic_calendar", "weekly", "Generate the economic calendar"),
    ("institution_watchlist", "weekly", "Refresh the institution watchlist"),
    ("task_execution", "weekly", "Execute pending research/data tasks"),
    ("weekly_report_publish", "weekly", "Publish the weekly report"),
    ("monthly_report_publish", "monthly", "Publish the monthly report"),
    ("yearly_report_publish", "yearly", "Publish the yearly report"),
];

pub(crate) fn seed_defaults(conn: &Connection) -> Result<()> {
    for (task_name, frequency, description) in DEFAULT_SCHEDULES {
        conn.execute(
            "INSERT OR IGNORE INTO schedule_tracker (task_name, frequency, metadata)
             VALUES (?1, ?2, ?3)",
            params![task_name, frequency, description],
        )?;
    }
    Ok(())
}

impl Datastore {
    /// Whether the named task is due per its frequency class.
    ///
    /// Unknown task: true. Disabled: false. Never run: true. Unknown
    /// frequency tag: true.
    pub fn should_run(&self, task_name: &str) -> Result<bool> {
        let row: Option<(Option<String>, String, bool)> = self
            .conn()
            .query_row(
                "SELECT last_run, frequency, enabled FROM schedule_tracker WHERE task_name = ?1",
                params![task_name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? != 0)),
            )
            .optional()?;

        let Some((last_run, frequency, enabled)) = row else {
            return Ok(true);
        };
        if !enabled {
            return Ok(false);
        }
        let Some(last_run) = last_run else {
            return Ok(true);
        };
        let Some(frequency) = Frequency::parse_lenient(&frequency) else {
            return Ok(true);
        };

        Ok(frequency.is_due(parse_ts(&last_run)?, now()))
    }

    /// Stamp the named task as having just run, creating the row (daily)
    /// when missing.
    pub fn mark_run(&self, task_name: &str) -> Result<()> {
        let ts = now_ts();
        let n = self.conn().execute(
            "UPDATE schedule_tracker SET last_run = ?1 WHERE task_name = ?2",
            params![ts, task_name],
        )?;
        if n == 0 {
            self.conn().execute(
                "INSERT INTO schedule_tracker (task_name, last_run, frequency)
                 VALUES (?1, ?2, 'daily')",
                params![task_name, ts],
            )?;
        }
        Ok(())
    }

    /// Enable or disable a tracked task.
    pub fn set_schedule_enabled(&self, task_name: &str, enabled: bool) -> Result<bool> {
        let n = self.conn().execute(
            "UPDATE schedule_tracker SET enabled = ?1 WHERE task_name = ?2",
            params![enabled as i64, task_name],
        )?;
        Ok(n > 0)
    }

    /// All tracked tasks with their current due-state, for inspection.
    pub fn schedule_status(&self) -> Result<Vec<ScheduleEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT task_name, last_run, frequency, enabled
             FROM schedule_tracker ORDER BY task_name",
        )?;
        let rows = stmt
            .query_map([], |row: &Row<'_>| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)? != 0,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (task_name, last_run, frequency, enabled) in rows {
            let should_run = self.should_run(&task_name)?;
            entries.push(ScheduleEntry {
                task_name,
                last_run,
                frequency,
                enabled,
                should_run,
            });
        }
        Ok(entries)
    }
}
