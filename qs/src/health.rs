//! Live system health queries
//!
//! Everything here is derived from the store at call time; nothing is
//! cached. The executor's health snapshot and the orchestrator's wait
//! loops both read these counters.

use rusqlite::params;
use serde::Serialize;

use crate::db::Datastore;
use crate::error::Result;
use crate::queue::TaskStats;
use crate::schedule::ScheduleEntry;
use crate::{now, now_ts, to_ts};

/// Queue depth counters
#[derive(Debug, Default, Clone, Serialize)]
pub struct QueueCounters {
    /// Pending tasks executable right now.
    pub ready_now: i64,
    /// Pending tasks scheduled strictly in the future.
    pub scheduled_future: i64,
    /// In-progress tasks older than one hour (orphan suspects).
    pub stuck_in_progress: i64,
}

/// Execution-log rollup over the last 24 hours
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExecutionSummary {
    pub last_24h_total: i64,
    pub last_24h_success: i64,
    pub last_24h_avg_time_ms: f64,
}

/// Full health snapshot
#[derive(Debug, Serialize)]
pub struct SystemHealth {
    pub timestamp: String,
    pub tasks: TaskStats,
    pub queue: QueueCounters,
    pub execution: ExecutionSummary,
    pub schedules: Vec<ScheduleEntry>,
}

impl Datastore {
    /// Queue depth counters from live queries.
    pub fn queue_counters(&self) -> Result<QueueCounters> {
        let ts = now_ts();

        let ready_now: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE status = 'pending'
               AND (scheduled_for IS NULL OR scheduled_for <= ?1)",
            params![ts],
            |row| row.get(0),
        )?;

        let scheduled_future: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE status = 'pending'
               AND scheduled_for IS NOT NULL
               AND scheduled_for > ?1",
            params![ts],
            |row| row.get(0),
        )?;

        let one_hour_ago = to_ts(&(now() - chrono::Duration::hours(1)));
        let stuck_in_progress: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE status = 'in_progress'
               AND COALESCE(updated_at, created_at) < ?1",
            params![one_hour_ago],
            |row| row.get(0),
        )?;

        Ok(QueueCounters {
            ready_now,
            scheduled_future,
            stuck_in_progress,
        })
    }

    /// Execution rollup over the last 24 hours.
    pub fn execution_summary(&self) -> Result<ExecutionSummary> {
        let yesterday = to_ts(&(now() - chrono::Duration::days(1)));
        let (total, success, avg): (i64, Option<i64>, Option<f64>) = self.conn().query_row(
            "SELECT COUNT(*), SUM(success), AVG(execution_time_ms)
             FROM task_execution_log
             WHERE executed_at >= ?1",
            params![yesterday],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(ExecutionSummary {
            last_24h_total: total,
            last_24h_success: success.unwrap_or(0),
            last_24h_avg_time_ms: avg.unwrap_or(0.0),
        })
    }

    /// Complete health snapshot for operators and the executor CLI.
    pub fn system_health(&self) -> Result<SystemHealth> {
        Ok(SystemHealth {
            timestamp: now_ts(),
            tasks: self.task_stats()?,
            queue: self.queue_counters()?,
            execution: self.execution_summary()?,
            schedules: self.schedule_status()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec_log::ExecutionEntry;
    use crate::queue::NewTask;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Datastore) {
        let dir = TempDir::new().unwrap();
        let store = Datastore::open(dir.path().join("store.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_queue_counters() {
        let (_dir, store) = open_temp();

        store.enqueue(&NewTask::new("ACT-NOW", "research", "now")).unwrap();
        let future = to_ts(&(now() + chrono::Duration::seconds(300)));
        store
            .enqueue(&NewTask::new("ACT-LATER", "research", "later").with_scheduled_for(future))
            .unwrap();
        store.enqueue(&NewTask::new("ACT-STUCK", "research", "stuck")).unwrap();
        store.claim("ACT-STUCK", "w").unwrap();
        let stale = to_ts(&(now() - chrono::Duration::hours(2)));
        store
            .conn()
            .execute(
                "UPDATE tasks SET updated_at = ?1 WHERE action_id = 'ACT-STUCK'",
                params![stale],
            )
            .unwrap();

        let counters = store.queue_counters().unwrap();
        assert_eq!(counters.ready_now, 1);
        assert_eq!(counters.scheduled_future, 1);
        assert_eq!(counters.stuck_in_progress, 1);
    }

    #[test]
    fn test_execution_summary() {
        let (_dir, store) = open_temp();

        store
            .log_execution(
                "ACT-A",
                &ExecutionEntry {
                    success: true,
                    execution_time_ms: 100.0,
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .log_execution(
                "ACT-B",
                &ExecutionEntry {
                    success: false,
                    execution_time_ms: 300.0,
                    ..Default::default()
                },
            )
            .unwrap();

        let summary = store.execution_summary().unwrap();
        assert_eq!(summary.last_24h_total, 2);
        assert_eq!(summary.last_24h_success, 1);
        assert!((summary.last_24h_avg_time_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_system_health_serializes() {
        let (_dir, store) = open_temp();
        let health = store.system_health().unwrap();
        let json = serde_json::to_string(&health).unwrap();
        assert!(json.contains("ready_now"));
        assert!(json.contains("schedules"));
    }
}
