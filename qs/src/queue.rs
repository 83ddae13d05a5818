//! Task queue operations
//!
//! The queue is a table plus a handful of carefully-shaped UPDATEs. The
//! only mutual-exclusion primitive is the conditional UPDATE in
//! [`Datastore::claim`]: the first transaction to commit wins, every
//! other racer sees rowcount 0 and moves on.

use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use crate::db::Datastore;
use crate::error::Result;
use crate::task::{ActionType, Priority, Task, TaskMetadata, TaskStatus};
use crate::{now, now_ts, to_ts};

/// Fields accepted by [`Datastore::enqueue`]
#[derive(Debug, Clone)]
pub struct NewTask {
    pub action_id: String,
    pub action_type: ActionType,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub source_report: Option<String>,
    pub source_context: Option<String>,
    pub deadline: Option<String>,
    pub scheduled_for: Option<String>,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub metadata: Option<TaskMetadata>,
}

impl NewTask {
    /// Create a pending task with defaults.
    pub fn new(action_id: impl Into<String>, action_type: impl Into<ActionType>, title: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            action_type: action_type.into(),
            title: title.into(),
            description: None,
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            source_report: None,
            source_context: None,
            deadline: None,
            scheduled_for: None,
            retry_count: 0,
            last_error: None,
            metadata: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Schedule the task for a future time (canonical timestamp string).
    pub fn with_scheduled_for(mut self, scheduled_for: impl Into<String>) -> Self {
        self.scheduled_for = Some(scheduled_for.into());
        self
    }

    /// Record the report the task was derived from.
    pub fn with_source(mut self, report: impl Into<String>, context: impl Into<String>) -> Self {
        self.source_report = Some(report.into());
        self.source_context = Some(context.into());
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Per-status task counters
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TaskStats {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub flagged: i64,
    pub skipped: i64,
}

impl TaskStats {
    pub fn total(&self) -> i64 {
        self.pending + self.in_progress + self.completed + self.failed + self.flagged + self.skipped
    }
}

const TASK_COLUMNS: &str = "id, action_id, action_type, title, description, priority, status, \
     source_report, source_context, deadline, scheduled_for, result, \
     created_at, updated_at, completed_at, retry_count, last_error, metadata";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let action_type: String = row.get(2)?;
    let priority: String = row.get(5)?;
    let status: String = row.get(6)?;
    let metadata: Option<String> = row.get(17)?;

    Ok(Task {
        id: row.get(0)?,
        action_id: row.get(1)?,
        action_type: ActionType::from(action_type),
        title: row.get(3)?,
        description: row.get(4)?,
        priority: priority.parse().unwrap_or_default(),
        status: status.parse().unwrap_or_default(),
        source_report: row.get(7)?,
        source_context: row.get(8)?,
        deadline: row.get(9)?,
        scheduled_for: row.get(10)?,
        result: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        completed_at: row.get(14)?,
        retry_count: row.get(15)?,
        last_error: row.get(16)?,
        metadata: TaskMetadata::parse(metadata.as_deref()),
    })
}

impl Datastore {
    /// Insert a task, upserting on `action_id`.
    ///
    /// A colliding enqueue refreshes description, priority, schedule and
    /// retry bookkeeping but never downgrades a terminal status, and
    /// keeps the existing metadata when the new row carries none.
    /// Returns the row id.
    pub fn enqueue(&self, task: &NewTask) -> Result<i64> {
        let ts = now_ts();
        self.conn().execute(
            "INSERT INTO tasks
                 (action_id, action_type, title, description, priority, status,
                  source_report, source_context, deadline, scheduled_for,
                  created_at, updated_at, retry_count, last_error, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12, ?13, ?14)
             ON CONFLICT(action_id) DO UPDATE SET
                 description = excluded.description,
                 priority = excluded.priority,
                 scheduled_for = excluded.scheduled_for,
                 retry_count = excluded.retry_count,
                 last_error = excluded.last_error,
                 updated_at = excluded.updated_at,
                 metadata = COALESCE(excluded.metadata, tasks.metadata),
                 status = CASE
                     WHEN tasks.status IN ('completed', 'failed', 'skipped') THEN tasks.status
                     ELSE excluded.status
                 END",
            params![
                task.action_id,
                task.action_type.as_str(),
                task.title,
                task.description,
                task.priority.as_str(),
                task.status.as_str(),
                task.source_report,
                task.source_context,
                task.deadline,
                task.scheduled_for,
                ts,
                task.retry_count,
                task.last_error,
                task.metadata.as_ref().map(|m| m.to_json()),
            ],
        )?;

        let id = self.conn().query_row(
            "SELECT id FROM tasks WHERE action_id = ?1",
            params![task.action_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Fetch a task by action id.
    pub fn task(&self, action_id: &str) -> Result<Option<Task>> {
        let task = self
            .conn()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE action_id = ?1"),
                params![action_id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    /// Tasks ready to execute now: pending with no schedule or a schedule
    /// at or before the current time.
    ///
    /// Dispatch order is total: priority (critical first), scheduled_for
    /// ascending with nulls first, created_at ascending, id ascending.
    pub fn ready_tasks(&self, limit: Option<usize>) -> Result<Vec<Task>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'pending'
               AND (scheduled_for IS NULL OR scheduled_for <= ?1)
             ORDER BY
                 CASE priority
                     WHEN 'critical' THEN 0
                     WHEN 'high' THEN 1
                     WHEN 'medium' THEN 2
                     ELSE 3
                 END,
                 scheduled_for ASC NULLS FIRST,
                 created_at ASC,
                 id ASC
             LIMIT ?2"
        ))?;
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let tasks = stmt
            .query_map(params![now_ts(), limit], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Pending tasks scheduled strictly in the future, soonest first.
    pub fn scheduled_tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'pending'
               AND scheduled_for IS NOT NULL
               AND scheduled_for > ?1
             ORDER BY scheduled_for ASC"
        ))?;
        let tasks = stmt
            .query_map(params![now_ts()], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Atomically claim a pending task for `worker_id`.
    ///
    /// Exactly one of any set of concurrent claimants succeeds; the rest
    /// observe rowcount 0 and get `false`.
    pub fn claim(&self, action_id: &str, worker_id: &str) -> Result<bool> {
        let ts = now_ts();
        let n = self.conn().execute(
            "UPDATE tasks
             SET status = 'in_progress',
                 updated_at = ?1,
                 metadata = json_set(
                     COALESCE(metadata, '{}'),
                     '$.claimed_at', ?1,
                     '$.claimed_by', ?2
                 )
             WHERE action_id = ?3
               AND status = 'pending'",
            params![ts, worker_id, action_id],
        )?;
        debug!(action_id, worker_id, claimed = n > 0, "claim attempt");
        Ok(n > 0)
    }

    /// Release an in-progress task back to pending.
    ///
    /// A positive `delay_seconds` pushes `scheduled_for` into the future
    /// to impose backoff; zero leaves the schedule untouched.
    pub fn release(&self, action_id: &str, reason: &str, delay_seconds: u64) -> Result<bool> {
        let ts = now_ts();
        let n = if delay_seconds > 0 {
            let scheduled_for = to_ts(&(now() + chrono::Duration::seconds(delay_seconds as i64)));
            self.conn().execute(
                "UPDATE tasks
                 SET status = 'pending',
                     scheduled_for = ?1,
                     updated_at = ?2,
                     metadata = json_set(
                         COALESCE(metadata, '{}'),
                         '$.released_at', ?2,
                         '$.release_reason', ?3
                     )
                 WHERE action_id = ?4
                   AND status = 'in_progress'",
                params![scheduled_for, ts, reason, action_id],
            )?
        } else {
            self.conn().execute(
                "UPDATE tasks
                 SET status = 'pending',
                     updated_at = ?1,
                     metadata = json_set(
                         COALESCE(metadata, '{}'),
                         '$.released_at', ?1,
                         '$.release_reason', ?2
                     )
                 WHERE action_id = ?3
                   AND status = 'in_progress'",
                params![ts, reason, action_id],
            )?
        };
        debug!(action_id, reason, delay_seconds, released = n > 0, "release attempt");
        Ok(n > 0)
    }

    /// Complete an in-progress task, storing its result.
    pub fn mark_complete(&self, action_id: &str, result: Option<&str>) -> Result<bool> {
        let ts = now_ts();
        let n = self.conn().execute(
            "UPDATE tasks
             SET status = 'completed', result = ?1, completed_at = ?2, updated_at = ?2
             WHERE action_id = ?3
               AND status = 'in_progress'",
            params![result, ts, action_id],
        )?;
        Ok(n > 0)
    }

    /// Fail a task terminally.
    pub fn mark_failed(&self, action_id: &str, error: &str) -> Result<bool> {
        let ts = now_ts();
        let n = self.conn().execute(
            "UPDATE tasks
             SET status = 'failed', last_error = ?1, completed_at = ?2, updated_at = ?2
             WHERE action_id = ?3",
            params![error, ts, action_id],
        )?;
        Ok(n > 0)
    }

    /// Park a task as skipped (terminal), e.g. an AI task with no
    /// provider configured.
    pub fn mark_skipped(&self, action_id: &str, reason: &str) -> Result<bool> {
        let ts = now_ts();
        let n = self.conn().execute(
            "UPDATE tasks
             SET status = 'skipped', last_error = ?1, completed_at = ?2, updated_at = ?2
             WHERE action_id = ?3
               AND status = 'in_progress'",
            params![reason, ts, action_id],
        )?;
        Ok(n > 0)
    }

    /// Bump the retry counter and record the error. Returns the new count.
    pub fn increment_retry(&mut self, action_id: &str, error: &str) -> Result<i64> {
        let tx = self.tx()?;
        tx.execute(
            "UPDATE tasks
             SET retry_count = retry_count + 1, last_error = ?1, updated_at = ?2
             WHERE action_id = ?3",
            params![error, now_ts(), action_id],
        )?;
        let count = tx
            .query_row(
                "SELECT retry_count FROM tasks WHERE action_id = ?1",
                params![action_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        tx.commit()?;
        Ok(count)
    }

    /// Reclaim orphaned tasks: in-progress rows not touched within
    /// `max_age_hours` go back to pending. Returns the number recovered.
    pub fn reset_stuck(&self, max_age_hours: u64) -> Result<usize> {
        let cutoff = to_ts(&(now() - chrono::Duration::hours(max_age_hours as i64)));
        let n = self.conn().execute(
            "UPDATE tasks
             SET status = 'pending', updated_at = ?1
             WHERE status = 'in_progress'
               AND COALESCE(updated_at, created_at) < ?2",
            params![now_ts(), cutoff],
        )?;
        Ok(n)
    }

    /// Whether a task already exists for (title, source_report).
    /// Insights extraction re-runs use this to avoid duplicating work
    /// items extracted in an earlier pass.
    pub fn has_task_for_source(&self, title: &str, source_report: &str) -> Result<bool> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tasks WHERE title = ?1 AND source_report = ?2",
            params![title, source_report],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// Highest action id starting with `prefix`, for date-sequenced id
    /// generation ("ACT-20260801-0007" -> next is 0008).
    pub fn latest_action_id(&self, prefix: &str) -> Result<Option<String>> {
        let pattern = format!("{}%", prefix.replace('%', ""));
        let id = self
            .conn()
            .query_row(
                "SELECT MAX(action_id) FROM tasks WHERE action_id LIKE ?1",
                params![pattern],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(id)
    }

    /// Per-status counters across the whole queue.
    pub fn task_stats(&self) -> Result<TaskStats> {
        let mut stmt = self
            .conn()
            .prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut stats = TaskStats::default();
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "in_progress" => stats.in_progress = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "flagged" => stats.flagged = count,
                "skipped" => stats.skipped = count,
                _ => {}
            }
        }
        Ok(stats)
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
    fn test_enqueue_and_fetch() {
        let (_dir, store) = open_temp();

        let id = store
            .enqueue(
                &NewTask::new("ACT-20260801-0001", "research", "Investigate flows")
                    .with_priority(Priority::High)
                    .with_description("dig into the flows"),
            )
            .unwrap();
        assert!(id > 0);

        let task = store.task("ACT-20260801-0001").unwrap().unwrap();
        assert_eq!(task.action_type, ActionType::Research);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn test_enqueue_upsert_single_row() {
        let (_dir, store) = open_temp();

        let a = store
            .enqueue(&NewTask::new("ACT-X", "research", "first title"))
            .unwrap();
        let b = store
            .enqueue(&NewTask::new("ACT-X", "research", "first title").with_description("updated"))
            .unwrap();
        assert_eq!(a, b);

        let task = store.task("ACT-X").unwrap().unwrap();
        assert_eq!(task.description.as_deref(), Some("updated"));
        assert_eq!(store.task_stats().unwrap().total(), 1);
    }

    #[test]
    fn test_enqueue_never_downgrades_terminal_status() {
        let (_dir, store) = open_temp();

        store.enqueue(&NewTask::new("ACT-T", "research", "t")).unwrap();
        assert!(store.claim("ACT-T", "w1").unwrap());
        assert!(store.mark_complete("ACT-T", Some("done")).unwrap());

        store.enqueue(&NewTask::new("ACT-T", "research", "t")).unwrap();
        let task = store.task("ACT-T").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_ready_ordering_priority_then_age() {
        let (_dir, store) = open_temp();

        store
            .enqueue(&NewTask::new("ACT-LOW", "research", "low").with_priority(Priority::Low))
            .unwrap();
        store
            .enqueue(&NewTask::new("ACT-CRIT", "research", "crit").with_priority(Priority::Critical))
            .unwrap();
        store
            .enqueue(&NewTask::new("ACT-MED", "research", "med").with_priority(Priority::Medium))
            .unwrap();

        let ready = store.ready_tasks(None).unwrap();
        let ids: Vec<_> = ready.iter().map(|t| t.action_id.as_str()).collect();
        assert_eq!(ids, vec!["ACT-CRIT", "ACT-MED", "ACT-LOW"]);
    }

    #[test]
    fn test_scheduled_task_not_ready_until_due() {
        let (_dir, store) = open_temp();

        let future = to_ts(&(now() + chrono::Duration::seconds(60)));
        store
            .enqueue(&NewTask::new("ACT-S", "research", "later").with_scheduled_for(future))
            .unwrap();

        assert!(store.ready_tasks(None).unwrap().is_empty());
        let scheduled = store.scheduled_tasks().unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].action_id, "ACT-S");

        // A past schedule is ready.
        let past = to_ts(&(now() - chrono::Duration::seconds(60)));
        store
            .enqueue(&NewTask::new("ACT-P", "research", "now").with_scheduled_for(past))
            .unwrap();
        let ready = store.ready_tasks(None).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].action_id, "ACT-P");
    }

    #[test]
    fn test_claim_only_from_pending() {
        let (_dir, store) = open_temp();

        store.enqueue(&NewTask::new("ACT-C", "research", "c")).unwrap();
        assert!(store.claim("ACT-C", "w1").unwrap());
        // Second claim loses.
        assert!(!store.claim("ACT-C", "w2").unwrap());
        // Claim on an absent id is false.
        assert!(!store.claim("ACT-NOPE", "w1").unwrap());

        let task = store.task("ACT-C").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.metadata.claimed_by.as_deref(), Some("w1"));
        assert!(task.metadata.claimed_at.is_some());
    }

    #[test]
    fn test_claim_release_claim() {
        let (_dir, store) = open_temp();

        store.enqueue(&NewTask::new("ACT-R", "research", "r")).unwrap();
        assert!(store.claim("ACT-R", "w1").unwrap());
        assert!(store.release("ACT-R", "voluntary", 0).unwrap());
        assert!(store.claim("ACT-R", "w1").unwrap());

        let task = store.task("ACT-R").unwrap().unwrap();
        assert_eq!(task.metadata.release_reason.as_deref(), Some("voluntary"));
    }

    #[test]
    fn test_release_requires_in_progress() {
        let (_dir, store) = open_temp();

        store.enqueue(&NewTask::new("ACT-NR", "research", "nr")).unwrap();
        assert!(!store.release("ACT-NR", "nope", 0).unwrap());
        assert!(!store.release("ACT-ABSENT", "nope", 0).unwrap());
    }

    #[test]
    fn test_release_with_delay_defers_readiness() {
        let (_dir, store) = open_temp();

        store.enqueue(&NewTask::new("ACT-D", "research", "d")).unwrap();
        assert!(store.claim("ACT-D", "w1").unwrap());
        assert!(store.release("ACT-D", "quota_retry_1", 120).unwrap());

        let task = store.task("ACT-D").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.scheduled_for.is_some());
        assert!(store.ready_tasks(None).unwrap().is_empty());
    }

    #[test]
    fn test_mark_complete_requires_claim() {
        let (_dir, store) = open_temp();

        store.enqueue(&NewTask::new("ACT-M", "research", "m")).unwrap();
        assert!(!store.mark_complete("ACT-M", None).unwrap());

        store.claim("ACT-M", "w1").unwrap();
        assert!(store.mark_complete("ACT-M", Some("ok")).unwrap());

        let task = store.task("ACT-M").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert_eq!(task.result.as_deref(), Some("ok"));
    }

    #[test]
    fn test_increment_retry_is_monotonic() {
        let (_dir, mut store) = open_temp();

        store.enqueue(&NewTask::new("ACT-RC", "research", "rc")).unwrap();
        assert_eq!(store.increment_retry("ACT-RC", "boom").unwrap(), 1);
        assert_eq!(store.increment_retry("ACT-RC", "boom again").unwrap(), 2);

        let task = store.task("ACT-RC").unwrap().unwrap();
        assert_eq!(task.retry_count, 2);
        assert_eq!(task.last_error.as_deref(), Some("boom again"));
    }

    #[test]
    fn test_reset_stuck_empty_store_is_noop() {
        let (_dir, store) = open_temp();
        assert_eq!(store.reset_stuck(1).unwrap(), 0);
    }

    #[test]
    fn test_reset_stuck_only_touches_old_claims() {
        let (_dir, store) = open_temp();

        store.enqueue(&NewTask::new("ACT-OLD", "research", "old")).unwrap();
        store.enqueue(&NewTask::new("ACT-NEW", "research", "new")).unwrap();
        store.claim("ACT-OLD", "w1").unwrap();
        store.claim("ACT-NEW", "w1").unwrap();

        // Backdate one claim by two hours.
        let stale = to_ts(&(now() - chrono::Duration::hours(2)));
        store
            .conn()
            .execute(
                "UPDATE tasks SET updated_at = ?1 WHERE action_id = 'ACT-OLD'",
                params![stale],
            )
            .unwrap();

        assert_eq!(store.reset_stuck(1).unwrap(), 1);
        assert_eq!(
            store.task("ACT-OLD").unwrap().unwrap().status,
            TaskStatus::Pending
        );
        assert_eq!(
            store.task("ACT-NEW").unwrap().unwrap().status,
            TaskStatus::InProgress
        );
    }

    #[test]
    fn test_latest_action_id_by_prefix() {
        let (_dir, store) = open_temp();
        assert_eq!(store.latest_action_id("ACT-20260801-").unwrap(), None);

        store
            .enqueue(&NewTask::new("ACT-20260801-0001", "research", "a"))
            .unwrap();
        store
            .enqueue(&NewTask::new("ACT-20260801-0007", "research", "b"))
            .unwrap();
        store
            .enqueue(&NewTask::new("ACT-20260731-0999", "research", "older day"))
            .unwrap();

        assert_eq!(
            store.latest_action_id("ACT-20260801-").unwrap().as_deref(),
            Some("ACT-20260801-0007")
        );
    }

    #[test]
    fn test_task_stats_counts() {
        let (_dir, store) = open_temp();

        store.enqueue(&NewTask::new("A1", "research", "a")).unwrap();
        store.enqueue(&NewTask::new("A2", "research", "b")).unwrap();
        store.claim("A2", "w").unwrap();

        let stats = store.task_stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.total(), 2);
    }
}
