//! Executor health snapshot

use serde::Serialize;

use queuestore::QueueCounters;

use super::ExecutorStats;

/// Structured health status returned by the daemon and the `--health`
/// CLI mode
#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    /// "running" or "stopped".
    pub state: String,
    pub worker_id: String,
    pub uptime_seconds: f64,
    pub current_task: Option<String>,
    pub stats: ExecutorStats,
    pub queue: QueueCounters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = HealthSnapshot {
            state: "stopped".to_string(),
            worker_id: "executor-host-1".to_string(),
            uptime_seconds: 0.0,
            current_task: None,
            stats: ExecutorStats::default(),
            queue: QueueCounters::default(),
        };
        let json = serde_json::to_string_pretty(&snapshot).unwrap();
        assert!(json.contains("\"worker_id\""));
        assert!(json.contains("\"ready_now\""));
    }
}
