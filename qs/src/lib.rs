//! QueueStore - persistent orchestration state on SQLite
//!
//! A single-file embedded store shared by every conductor process. All
//! cross-process coordination (task claims, leader election, schedule
//! gating, publish dedup) goes through this file; there is no other
//! channel between workers.
//!
//! # Modules
//!
//! - [`db`] - store handle, pragmas, schema and migrations, config/toggles
//! - [`task`] - task record and its enums
//! - [`queue`] - task queue operations (enqueue, claim, release, ...)
//! - [`exec_log`] - append-only execution log with transient-error retry
//! - [`lifecycle`] - document lifecycle registry
//! - [`sync`] - publish records (fingerprint dedup bookkeeping)
//! - [`schedule`] - frequency-classed schedule tracker
//! - [`content`] - generated journals/reports registry
//! - [`audit`] - sanitizer audit trail
//! - [`health`] - live queue/executor health queries

pub mod audit;
pub mod cli;
pub mod content;
pub mod db;
pub mod error;
pub mod exec_log;
pub mod health;
pub mod lifecycle;
pub mod queue;
pub mod schedule;
pub mod sync;
pub mod task;

pub use db::{Datastore, Toggle};
pub use error::{Result, StoreError};
pub use health::{ExecutionSummary, QueueCounters, SystemHealth};
pub use lifecycle::{DocStatus, LifecycleRecord};
pub use queue::{NewTask, TaskStats};
pub use schedule::{Frequency, ScheduleEntry};
pub use sync::PublishRecord;
pub use task::{ActionType, Priority, Task, TaskMetadata, TaskStatus};

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC time as the canonical on-disk timestamp string.
///
/// Every timestamp in the store uses this format (RFC3339, microsecond
/// precision, `Z` suffix) so that lexicographic comparison in SQL and
/// chronological comparison coincide.
pub fn now_ts() -> String {
    to_ts(&Utc::now())
}

/// Format a time as the canonical on-disk timestamp string.
pub fn to_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a canonical timestamp string back into a UTC time.
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let ts = now_ts();
        let parsed = parse_ts(&ts).unwrap();
        assert_eq!(to_ts(&parsed), ts);
    }

    #[test]
    fn test_timestamps_order_lexicographically() {
        let earlier = to_ts(&(Utc::now() - chrono::Duration::seconds(5)));
        let later = now_ts();
        assert!(earlier < later);
    }
}
