//! Per-document-type cadence gate
//!
//! File names decide the publishing cadence. Exclusions win over every
//! inclusion; daily names are always eligible; weekly, monthly and
//! yearly names consume a schedule-tracker slot keyed by the current
//! period, so the first qualifying document per period publishes and the
//! rest wait for the next one.

use chrono::{DateTime, Datelike, Utc};
use tracing::debug;

use queuestore::Datastore;

/// Names that never publish: internal task outputs and digests.
const EXCLUDED_PATTERNS: [&str; 9] = [
    "monitor_",
    "data_fetch_",
    "calc_",
    "code_",
    "_act-",
    "act-",
    "file_index",
    "digest_",
    "digests/",
];

/// Names eligible every cycle.
const DAILY_PATTERNS: [&str; 7] = [
    "journal_",
    "premarket_",
    "research_",
    "news_scan_",
    "catalyst",
    "economic_",
    "calendar_",
];

const WEEKLY_PATTERNS: [&str; 2] = ["weekly_", "rundown_"];
const MONTHLY_PATTERNS: [&str; 1] = ["monthly_"];
const YEARLY_PATTERNS: [&str; 2] = ["yearly_", "1y_"];

/// Outcome of the cadence gate for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadenceDecision {
    /// Publish this cycle.
    Eligible,
    /// Periodic slot already consumed this period.
    SkippedSchedule,
    /// Never publishes.
    Excluded,
}

fn matches_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

/// Decide whether `relative_path` may publish now. Consumes the periodic
/// slot (mark_run) when it grants a weekly/monthly/yearly publication.
pub fn check(store: &Datastore, relative_path: &str, now: DateTime<Utc>) -> queuestore::Result<CadenceDecision> {
    let lowered = relative_path.to_lowercase();

    if matches_any(&lowered, &EXCLUDED_PATTERNS) {
        return Ok(CadenceDecision::Excluded);
    }

    if matches_any(&lowered, &DAILY_PATTERNS) {
        return Ok(CadenceDecision::Eligible);
    }

    if matches_any(&lowered, &WEEKLY_PATTERNS) {
        let iso = now.iso_week();
        return consume_slot(store, &format!("remote_sync_weekly_{}_{}", iso.year(), iso.week()));
    }

    if matches_any(&lowered, &MONTHLY_PATTERNS) {
        return consume_slot(store, &format!("remote_sync_monthly_{}_{:02}", now.year(), now.month()));
    }

    if matches_any(&lowered, &YEARLY_PATTERNS) {
        return consume_slot(store, &format!("remote_sync_yearly_{}", now.year()));
    }

    // Unmatched names publish on the daily cadence.
    Ok(CadenceDecision::Eligible)
}

fn consume_slot(store: &Datastore, slot_key: &str) -> queuestore::Result<CadenceDecision> {
    if store.should_run(slot_key)? {
        store.mark_run(slot_key)?;
        debug!(slot_key, "Periodic publish slot consumed");
        Ok(CadenceDecision::Eligible)
    } else {
        Ok(CadenceDecision::SkippedSchedule)
    }
}
