//! Cadence-gated remote publishing
//!
//! One pass walks the output tree and, for every markdown file, applies
//! three gates in order: header readiness, per-type cadence, fingerprint
//! dedup. Only a file passing all three reaches the remote target. A
//! failure on one file never aborts the pass.

pub mod cadence;
pub mod remote;
pub mod retry;

pub use cadence::CadenceDecision;
pub use remote::{PublishError, RemoteTarget, RestRemote, SyncOutcome};

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use queuestore::{Datastore, Toggle, now};

use crate::fingerprint::fingerprint;
use crate::frontmatter::{detect_type, is_ready_for_sync};

/// Result of syncing one file
#[derive(Debug)]
pub enum FileSync {
    Published(SyncOutcome),
    /// Fingerprint matched the last publish; no remote call was made.
    Unchanged,
    /// Header status gates the file out.
    NotReady,
}

/// Counters for one publishing pass
#[derive(Debug, Default, Clone, Serialize)]
pub struct PublishReport {
    pub published: usize,
    pub unchanged: usize,
    pub not_ready: usize,
    pub skipped_schedule: usize,
    pub excluded: usize,
    pub failed: usize,
    /// Publishing toggle was off; nothing was attempted.
    pub disabled: bool,
    /// Remote credentials missing; remote calls were skipped.
    pub not_configured: bool,
}

/// Type-aware publisher
pub struct Publisher {
    remote: Arc<dyn RemoteTarget>,
}

impl Publisher {
    pub fn new(remote: Arc<dyn RemoteTarget>) -> Self {
        Self { remote }
    }

    /// Sync one file. `force` bypasses the fingerprint dedup (used by
    /// the retry worker); the readiness gate always applies.
    pub async fn sync_file(&self, store: &mut Datastore, path: &Path, force: bool) -> Result<FileSync, PublishError> {
        let content = std::fs::read_to_string(path)?;
        if !is_ready_for_sync(&content) {
            return Ok(FileSync::NotReady);
        }
        self.sync_ready_content(store, path, &content, force).await
    }

    async fn sync_ready_content(
        &self,
        store: &mut Datastore,
        path: &Path,
        content: &str,
        force: bool,
    ) -> Result<FileSync, PublishError> {
        let digest = fingerprint(content);
        if !force && store.is_synced(path, &digest)? {
            debug!(path = %path.display(), "Fingerprint unchanged, skipping remote call");
            return Ok(FileSync::Unchanged);
        }

        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let doc_type = detect_type(&file_name);

        let outcome = self.remote.sync(path, content, doc_type).await?;
        store.record_sync(
            path,
            &digest,
            &outcome.remote_id,
            outcome.remote_url.as_deref(),
            Some(doc_type),
        )?;

        info!(path = %path.display(), remote_id = %outcome.remote_id, "Published");
        Ok(FileSync::Published(outcome))
    }

    /// One publishing pass over the output tree.
    pub async fn run_pass(&self, store: &mut Datastore, output_dir: &Path) -> PublishReport {
        let mut report = PublishReport::default();

        match store.is_enabled(Toggle::Publishing) {
            Ok(true) => {}
            Ok(false) => {
                info!("Publishing disabled via toggle");
                report.disabled = true;
                return report;
            }
            Err(e) => {
                warn!(error = %e, "Toggle check failed, skipping pass");
                report.disabled = true;
                return report;
            }
        }

        let entries: Vec<_> = WalkDir::new(output_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
            .filter(|e| !e.path().components().any(|c| c.as_os_str() == "archive"))
            .collect();

        let today = now();
        for entry in entries {
            let path = entry.path();
            let relative = path
                .strip_prefix(output_dir)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();

            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Unreadable file, skipping");
                    report.failed += 1;
                    continue;
                }
            };

            if !is_ready_for_sync(&content) {
                report.not_ready += 1;
                continue;
            }

            match cadence::check(store, &relative, today) {
                Ok(CadenceDecision::Eligible) => {}
                Ok(CadenceDecision::SkippedSchedule) => {
                    report.skipped_schedule += 1;
                    continue;
                }
                Ok(CadenceDecision::Excluded) => {
                    report.excluded += 1;
                    continue;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cadence check failed");
                    report.failed += 1;
                    continue;
                }
            }

            match self.sync_ready_content(store, path, &content, false).await {
                Ok(FileSync::Published(_)) => report.published += 1,
                Ok(FileSync::Unchanged) => report.unchanged += 1,
                Ok(FileSync::NotReady) => report.not_ready += 1,
                Err(PublishError::NotConfigured(msg)) => {
                    // Logged once; further remote calls this pass are pointless.
                    warn!(%msg, "Remote target not configured");
                    report.not_configured = true;
                    break;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Publish failed");
                    let _ = store.bump_publish_retry(path, &e.to_string());
                    report.failed += 1;
                }
            }
        }

        info!(
            published = report.published,
            unchanged = report.unchanged,
            not_ready = report.not_ready,
            skipped_schedule = report.skipped_schedule,
            excluded = report.excluded,
            failed = report.failed,
            "Publishing pass complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Remote that records calls and mints sequential ids.
    pub(crate) struct RecordingRemote {
        pub calls: Mutex<Vec<String>>,
    }

    impl RecordingRemote {
        pub(crate) fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RemoteTarget for RecordingRemote {
        fn name(&self) -> &str {
            "recording"
        }
        async fn sync(&self, path: &Path, _content: &str, _doc_type: &str) -> Result<SyncOutcome, PublishError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(path.display().to_string());
            Ok(SyncOutcome {
                remote_id: format!("rem-{}", calls.len()),
                remote_url: Some(format!("https://remote.example/rem-{}", calls.len())),
                created: true,
            })
        }
    }

    fn setup() -> (TempDir, Datastore, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let store = Datastore::open(dir.path().join("store.db")).unwrap();
        let output = dir.path().join("output");
        std::fs::create_dir_all(&output).unwrap();
        (dir, store, output)
    }

    fn write_doc(dir: &Path, name: &str, status: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("---\nstatus: {status}\ndoc_type: journal\n---\n\nBody of {name}\n")).unwrap();
        path
    }

    #[tokio::test]
    async fn test_pass_publishes_ready_daily_docs_once() {
        let (_dir, mut store, output) = setup();
        write_doc(&output, "journal_2026-08-01.md", "published");
        write_doc(&output, "journal_2026-07-31.md", "draft");

        let remote = Arc::new(RecordingRemote::new());
        let publisher = Publisher::new(remote.clone());

        let report = publisher.run_pass(&mut store, &output).await;
        assert_eq!(report.published, 1);
        assert_eq!(report.not_ready, 1);
        assert_eq!(remote.call_count(), 1);

        // Second pass over the unchanged tree makes no remote calls.
        let report = publisher.run_pass(&mut store, &output).await;
        assert_eq!(report.published, 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(remote.call_count(), 1);
    }

    #[tokio::test]
    async fn test_edit_triggers_exactly_one_republication() {
        let (_dir, mut store, output) = setup();
        let path = write_doc(&output, "journal_2026-08-01.md", "published");

        let remote = Arc::new(RecordingRemote::new());
        let publisher = Publisher::new(remote.clone());
        publisher.run_pass(&mut store, &output).await;
        assert_eq!(remote.call_count(), 1);

        // Edit the body; next pass republishes once.
        std::fs::write(&path, "---\nstatus: published\n---\n\nEdited body\n").unwrap();
        let report = publisher.run_pass(&mut store, &output).await;
        assert_eq!(report.published, 1);
        assert_eq!(remote.call_count(), 2);

        // Publish record carries the new fingerprint.
        let record = store.sync_record(&path).unwrap().unwrap();
        assert_eq!(record.file_hash, fingerprint("---\nstatus: published\n---\n\nEdited body\n"));
    }

    #[tokio::test]
    async fn test_excluded_files_never_reach_remote() {
        let (_dir, mut store, output) = setup();
        write_doc(&output, "monitor_gsr.md", "published");
        write_doc(&output, "research_ACT-20260801-0001.md", "published");

        let remote = Arc::new(RecordingRemote::new());
        let publisher = Publisher::new(remote.clone());
        let report = publisher.run_pass(&mut store, &output).await;

        assert_eq!(report.excluded, 2);
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_toggle_disables_pass() {
        let (_dir, mut store, output) = setup();
        write_doc(&output, "journal_2026-08-01.md", "published");
        store.set_enabled(Toggle::Publishing, false).unwrap();

        let remote = Arc::new(RecordingRemote::new());
        let publisher = Publisher::new(remote.clone());
        let report = publisher.run_pass(&mut store, &output).await;

        assert!(report.disabled);
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_pass() {
        struct FlakyRemote;
        #[async_trait]
        impl RemoteTarget for FlakyRemote {
            fn name(&self) -> &str {
                "flaky"
            }
            async fn sync(&self, path: &Path, _c: &str, _t: &str) -> Result<SyncOutcome, PublishError> {
                if path.to_string_lossy().contains("journal_2026-07") {
                    Err(PublishError::Remote {
                        status: 500,
                        message: "boom".to_string(),
                    })
                } else {
                    Ok(SyncOutcome {
                        remote_id: "rem-ok".to_string(),
                        remote_url: None,
                        created: true,
                    })
                }
            }
        }

        let (_dir, mut store, output) = setup();
        write_doc(&output, "journal_2026-07-31.md", "published");
        write_doc(&output, "journal_2026-08-01.md", "published");

        let publisher = Publisher::new(Arc::new(FlakyRemote));
        let report = publisher.run_pass(&mut store, &output).await;

        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_promoted_on_publish() {
        let (_dir, mut store, output) = setup();
        let path = write_doc(&output, "journal_2026-08-01.md", "published");
        store
            .register_document(&path, "journal", queuestore::DocStatus::InProgress, None)
            .unwrap();

        let publisher = Publisher::new(Arc::new(RecordingRemote::new()));
        publisher.run_pass(&mut store, &output).await;

        let doc = store.document(&path).unwrap().unwrap();
        assert_eq!(doc.status, queuestore::DocStatus::Published);
        assert!(doc.remote_id.is_some());
        assert!(doc.published_at.is_some());
    }
}
