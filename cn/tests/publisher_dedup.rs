//! Publisher fingerprint dedup and cadence behavior over a real tree

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use conductor::publisher::{PublishError, Publisher, RemoteTarget, SyncOutcome, retry};
use queuestore::{Datastore, DocStatus};
use tempfile::TempDir;

/// Remote that counts calls per path.
struct CountingRemote {
    calls: Mutex<Vec<PathBuf>>,
}

impl CountingRemote {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }
    fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteTarget for CountingRemote {
    fn name(&self) -> &str {
        "counting"
    }
    async fn sync(&self, path: &Path, _content: &str, _doc_type: &str) -> Result<SyncOutcome, PublishError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(path.to_path_buf());
        Ok(SyncOutcome {
            remote_id: format!("rem-{}", calls.len()),
            remote_url: Some(format!("https://remote.example/{}", calls.len())),
            created: true,
        })
    }
}

fn setup() -> (TempDir, Datastore, PathBuf) {
    let dir = TempDir::new().unwrap();
    let store = Datastore::open(dir.path().join("conductor.db")).unwrap();
    let output = dir.path().join("output");
    std::fs::create_dir_all(&output).unwrap();
    (dir, store, output)
}

fn write_ready(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("---\nstatus: published\ndoc_type: journal\n---\n\n{body}\n")).unwrap();
    path
}

#[tokio::test]
async fn unchanged_content_publishes_exactly_once() {
    let (_dir, mut store, output) = setup();
    let path = write_ready(&output, "journal_2026-08-01.md", "Original content");

    let remote = CountingRemote::new();
    let publisher = Publisher::new(remote.clone());

    // First pass: one remote call, one publish record.
    let report = publisher.run_pass(&mut store, &output).await;
    assert_eq!(report.published, 1);
    assert_eq!(remote.count(), 1);
    let record = store.sync_record(&path).unwrap().unwrap();
    let first_synced_at = record.synced_at.clone();

    // Second and third passes over the unchanged tree: no remote calls,
    // publish record untouched.
    for _ in 0..2 {
        let report = publisher.run_pass(&mut store, &output).await;
        assert_eq!(report.published, 0);
        assert_eq!(report.unchanged, 1);
    }
    assert_eq!(remote.count(), 1);
    let record = store.sync_record(&path).unwrap().unwrap();
    assert_eq!(record.synced_at, first_synced_at);

    // Edit: exactly one more remote call, fingerprint updated.
    let old_hash = record.file_hash.clone();
    write_ready(&output, "journal_2026-08-01.md", "Edited content");
    let report = publisher.run_pass(&mut store, &output).await;
    assert_eq!(report.published, 1);
    assert_eq!(remote.count(), 2);
    let record = store.sync_record(&path).unwrap().unwrap();
    assert_ne!(record.file_hash, old_hash);
}

#[tokio::test]
async fn weekly_cadence_admits_one_document_per_week() {
    let (_dir, mut store, output) = setup();
    write_ready(&output, "weekly_report_a.md", "A");
    write_ready(&output, "weekly_report_b.md", "B");

    let remote = CountingRemote::new();
    let publisher = Publisher::new(remote.clone());
    let report = publisher.run_pass(&mut store, &output).await;

    assert_eq!(report.published, 1);
    assert_eq!(report.skipped_schedule, 1);
    assert_eq!(remote.count(), 1);
}

#[tokio::test]
async fn drafts_and_artifacts_stay_local() {
    let (_dir, mut store, output) = setup();
    // Draft journal: readiness gate.
    let draft = output.join("journal_2026-08-02.md");
    std::fs::write(&draft, "---\nstatus: draft\n---\n\nNot done\n").unwrap();
    // Headerless file: treated as draft.
    std::fs::write(output.join("scratch.md"), "no header\n").unwrap();
    // Ready but excluded by name.
    write_ready(&output, "monitor_gsr.md", "internal");

    let remote = CountingRemote::new();
    let publisher = Publisher::new(remote.clone());
    let report = publisher.run_pass(&mut store, &output).await;

    assert_eq!(report.not_ready, 2);
    assert_eq!(report.excluded, 1);
    assert_eq!(remote.count(), 0);
}

#[tokio::test]
async fn failed_publish_is_retried_by_the_retry_worker() {
    /// Remote that fails a path until told otherwise.
    struct FailingRemote {
        healthy: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl RemoteTarget for FailingRemote {
        fn name(&self) -> &str {
            "failing"
        }
        async fn sync(&self, _p: &Path, _c: &str, _t: &str) -> Result<SyncOutcome, PublishError> {
            if self.healthy.load(std::sync::atomic::Ordering::SeqCst) {
                Ok(SyncOutcome {
                    remote_id: "rem-late".to_string(),
                    remote_url: None,
                    created: true,
                })
            } else {
                Err(PublishError::Remote {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            }
        }
    }

    let (_dir, mut store, output) = setup();
    let path = write_ready(&output, "journal_2026-08-01.md", "body");
    store
        .register_document(&path, "journal", DocStatus::InProgress, None)
        .unwrap();

    let remote = Arc::new(FailingRemote {
        healthy: std::sync::atomic::AtomicBool::new(false),
    });
    let publisher = Publisher::new(remote.clone());

    // Failing pass bumps the document's publish retry counter.
    let report = publisher.run_pass(&mut store, &output).await;
    assert_eq!(report.failed, 1);
    assert_eq!(store.document(&path).unwrap().unwrap().retry_count, 1);

    // Remote recovers; the retry worker publishes the straggler.
    remote.healthy.store(true, std::sync::atomic::Ordering::SeqCst);
    let retry_report = retry::run_retry_pass(&mut store, &publisher, 5).await;
    assert_eq!(retry_report.succeeded, 1);

    let doc = store.document(&path).unwrap().unwrap();
    assert_eq!(doc.status, DocStatus::Published);
    assert_eq!(doc.remote_id.as_deref(), Some("rem-late"));
}
