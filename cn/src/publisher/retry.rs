//! Publish retry worker
//!
//! A passive pass over lifecycle rows that never reached `published`.
//! Each candidate below the attempt cap is re-synced with the dedup
//! bypassed; failures bump the per-document retry counter so chronically
//! broken documents age out at the cap instead of hammering the remote.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use queuestore::Datastore;

use super::{FileSync, PublishError, Publisher};

/// Candidates examined per pass.
const RETRY_BATCH: usize = 50;

/// Counters for one retry pass
#[derive(Debug, Default, Clone, Serialize)]
pub struct RetryReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows skipped because retry_count reached the cap.
    pub capped: usize,
    pub not_ready: usize,
    pub not_configured: bool,
}

/// Re-attempt publication for unpublished lifecycle rows.
pub async fn run_retry_pass(store: &mut Datastore, publisher: &Publisher, retry_cap: i64) -> RetryReport {
    let mut report = RetryReport::default();

    let candidates = match store.publish_retry_candidates(RETRY_BATCH) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "Could not list retry candidates");
            return report;
        }
    };

    for record in candidates {
        if record.retry_count >= retry_cap {
            report.capped += 1;
            continue;
        }
        report.attempted += 1;

        let path = Path::new(&record.file_path).to_path_buf();
        match publisher.sync_file(store, &path, true).await {
            Ok(FileSync::Published(_)) | Ok(FileSync::Unchanged) => report.succeeded += 1,
            Ok(FileSync::NotReady) => report.not_ready += 1,
            Err(PublishError::NotConfigured(msg)) => {
                warn!(%msg, "Remote target not configured, ending retry pass");
                report.not_configured = true;
                break;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Retry publish failed");
                let _ = store.bump_publish_retry(&path, &e.to_string());
                report.failed += 1;
            }
        }
    }

    if report.attempted > 0 || report.capped > 0 {
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            capped = report.capped,
            "Publish retry pass complete"
        );
    }
    report
}
