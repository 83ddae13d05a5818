//! Executor daemon
//!
//! A long-running worker that drains the task queue under strict claim
//! discipline: one task at a time, claimed with an atomic compare-and-set,
//! finished with exactly one terminal transition or released back to
//! pending under the retry policy. Orphan recovery on startup and on a
//! timer is the only mechanism that reclaims tasks whose holder died.

pub mod cli;
pub mod health;
pub mod heartbeat;
pub mod process;
pub mod quota;

pub use health::HealthSnapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use queuestore::exec_log::ExecutionEntry;
use queuestore::{Datastore, Task, now_ts};

use crate::config::ExecutorConfig;
use crate::handlers::{HandlerContext, HandlerError, HandlerRegistry};

/// Tasks fetched per poll.
const BATCH_SIZE: usize = 10;

/// Running statistics, shared with the heartbeat task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub started_at: Option<String>,
    pub tasks_executed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub tasks_skipped: u64,
    pub orphans_recovered: u64,
    pub total_execution_time_ms: f64,
    pub last_poll_at: Option<String>,
    pub last_task_at: Option<String>,
    pub consecutive_errors: u64,
}

/// Worker id in the form `executor-<hostname>-<pid>`.
pub fn default_worker_id() -> String {
    let hostname = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    format!("executor-{}-{}", hostname, std::process::id())
}

/// The executor daemon
pub struct ExecutorDaemon {
    store: Datastore,
    registry: HandlerRegistry,
    handler_ctx: HandlerContext,
    config: ExecutorConfig,
    worker_id: String,
    dry_run: bool,
    stats: Arc<Mutex<ExecutorStats>>,
    current_task: Option<String>,
    shutdown: watch::Receiver<bool>,
    reload: Arc<AtomicBool>,
    is_leader: bool,
    started: Option<Instant>,
}

impl ExecutorDaemon {
    /// Build a daemon over an open store.
    pub fn new(
        store: Datastore,
        registry: HandlerRegistry,
        handler_ctx: HandlerContext,
        config: ExecutorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            registry,
            handler_ctx,
            config,
            worker_id: default_worker_id(),
            dry_run: false,
            stats: Arc::new(Mutex::new(ExecutorStats::default())),
            current_task: None,
            shutdown,
            reload: Arc::new(AtomicBool::new(false)),
            is_leader: false,
            started: None,
        }
    }

    /// Simulate execution: tasks are claimed and released, never run.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the worker id (tests, supervised children).
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Flag checked each loop; SIGHUP handlers set it to request a
    /// config re-read.
    pub fn reload_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.reload)
    }

    fn with_stats<R>(&self, f: impl FnOnce(&mut ExecutorStats) -> R) -> R {
        let mut guard = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sweep orphaned claims back to pending. Errors are logged, not
    /// propagated; a failed sweep must not take the daemon down.
    pub fn recover_orphans(&mut self) -> usize {
        match self.store.reset_stuck(self.config.orphan_timeout_hours) {
            Ok(0) => 0,
            Ok(count) => {
                info!(count, "Recovered orphaned tasks");
                self.with_stats(|s| s.orphans_recovered += count as u64);
                count
            }
            Err(e) => {
                error!(error = %e, "Orphan recovery failed");
                0
            }
        }
    }

    /// Claim and execute one task. Returns true only on success.
    pub async fn execute_task(&mut self, task: &Task) -> bool {
        let action_id = task.action_id.clone();

        match self.store.claim(&action_id, &self.worker_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(action_id, "Task already claimed elsewhere");
                return false;
            }
            Err(e) => {
                error!(action_id, error = %e, "Claim failed");
                self.with_stats(|s| s.consecutive_errors += 1);
                return false;
            }
        }

        self.current_task = Some(action_id.clone());
        let start = Instant::now();
        info!(action_id, title = %task.title, "Executing task");

        let succeeded = if self.dry_run {
            self.finish_dry_run(&action_id).await
        } else {
            let outcome = self.registry.execute(task, &self.handler_ctx).await;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            self.with_stats(|s| {
                s.tasks_executed += 1;
                s.total_execution_time_ms += elapsed_ms;
                s.last_task_at = Some(now_ts());
            });

            match outcome {
                Ok(result) => self.finish_success(&action_id, &result.result_data, &result.artifacts, elapsed_ms),
                Err(e) => self.finish_failure(task, e, elapsed_ms),
            }
        };

        self.current_task = None;
        succeeded
    }

    async fn finish_dry_run(&mut self, action_id: &str) -> bool {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Err(e) = self.store.release(action_id, "dry_run", 0) {
            error!(action_id, error = %e, "Dry-run release failed");
        }
        self.with_stats(|s| {
            s.tasks_executed += 1;
            s.tasks_succeeded += 1;
            s.last_task_at = Some(now_ts());
        });
        info!(action_id, "Dry-run: task simulated and released");
        true
    }

    fn finish_success(
        &mut self,
        action_id: &str,
        result_data: &str,
        artifacts: &[std::path::PathBuf],
        elapsed_ms: f64,
    ) -> bool {
        if let Err(e) = self.store.mark_complete(action_id, Some(result_data)) {
            error!(action_id, error = %e, "mark_complete failed");
        }
        let artifacts_json = (!artifacts.is_empty())
            .then(|| serde_json::to_string(&artifacts).unwrap_or_default());
        if let Err(e) = self.store.log_execution(
            action_id,
            &ExecutionEntry {
                success: true,
                result_data: Some(result_data),
                execution_time_ms: elapsed_ms,
                artifacts: artifacts_json.as_deref(),
                ..Default::default()
            },
        ) {
            error!(action_id, error = %e, "Execution log append failed");
        }
        self.with_stats(|s| {
            s.tasks_succeeded += 1;
            s.consecutive_errors = 0;
        });
        info!(action_id, elapsed_ms, "Task completed");
        true
    }

    fn finish_failure(&mut self, task: &Task, err: HandlerError, elapsed_ms: f64) -> bool {
        let action_id = &task.action_id;

        // Retriable errors whose message betrays a quota condition get
        // the delayed release.
        let err = match err {
            HandlerError::Retriable(m) if quota::is_quota_error(&m) => HandlerError::Quota(m),
            other => other,
        };

        match err {
            HandlerError::Skipped(reason) => {
                warn!(action_id, reason, "Task skipped");
                let _ = self.store.mark_skipped(action_id, &reason);
                self.log_failure(action_id, &reason, elapsed_ms);
                self.with_stats(|s| s.tasks_skipped += 1);
            }
            HandlerError::Permanent(message) => {
                error!(action_id, message, "Task failed permanently");
                let _ = self.store.mark_failed(action_id, &message);
                self.log_failure(action_id, &message, elapsed_ms);
                self.with_stats(|s| {
                    s.tasks_failed += 1;
                    s.consecutive_errors += 1;
                });
            }
            HandlerError::Quota(message) => {
                if quota::retry_allowed(task.retry_count, self.config.max_retries) {
                    let count = self.store.increment_retry(action_id, &message).unwrap_or(task.retry_count + 1);
                    let delay =
                        quota::backoff_delay(count, self.config.initial_backoff_secs, self.config.max_backoff_secs);
                    let reason = format!("quota_retry_{count}");
                    let _ = self.store.release(action_id, &reason, delay);
                    warn!(action_id, delay, retry = count, "Quota-limited, released with backoff");
                    self.with_stats(|s| s.tasks_retried += 1);
                } else {
                    error!(action_id, message, "Quota retries exhausted");
                    let _ = self.store.mark_failed(action_id, &message);
                    self.with_stats(|s| s.tasks_failed += 1);
                }
                self.log_failure(action_id, &message, elapsed_ms);
                self.with_stats(|s| s.consecutive_errors += 1);
            }
            HandlerError::Retriable(message) => {
                if quota::retry_allowed(task.retry_count, self.config.max_retries) {
                    let count = self.store.increment_retry(action_id, &message).unwrap_or(task.retry_count + 1);
                    let reason = format!("retry_{count}");
                    let _ = self.store.release(action_id, &reason, self.config.retry_delay_secs);
                    warn!(action_id, retry = count, "Task failed, released for retry");
                    self.with_stats(|s| s.tasks_retried += 1);
                } else {
                    error!(action_id, message, "Retries exhausted");
                    let _ = self
                        .store
                        .mark_failed(action_id, &format!("Max retries exceeded: {message}"));
                    self.with_stats(|s| s.tasks_failed += 1);
                }
                self.log_failure(action_id, &message, elapsed_ms);
                self.with_stats(|s| s.consecutive_errors += 1);
            }
        }
        false
    }

    fn log_failure(&self, action_id: &str, message: &str, elapsed_ms: f64) {
        if let Err(e) = self.store.log_execution(
            action_id,
            &ExecutionEntry {
                success: false,
                error_message: Some(message),
                execution_time_ms: elapsed_ms,
                ..Default::default()
            },
        ) {
            error!(action_id, error = %e, "Execution log append failed");
        }
    }

    /// One poll: fetch ready tasks and execute them in order. Returns the
    /// number that succeeded.
    pub async fn poll_and_execute(&mut self, remaining_limit: Option<usize>) -> usize {
        self.with_stats(|s| s.last_poll_at = Some(now_ts()));

        let batch = remaining_limit.map_or(BATCH_SIZE, |r| r.min(BATCH_SIZE));
        let ready = match self.store.ready_tasks(Some(batch)) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Poll failed");
                self.with_stats(|s| s.consecutive_errors += 1);
                return 0;
            }
        };
        if ready.is_empty() {
            return 0;
        }

        info!(count = ready.len(), "Found ready tasks");
        let mut executed = 0;
        for task in &ready {
            if self.shutdown_requested() {
                info!("Shutdown requested, stopping execution loop");
                break;
            }
            if let Some(limit) = remaining_limit {
                if executed >= limit {
                    break;
                }
            }
            if self.execute_task(task).await {
                executed += 1;
            }
        }
        executed
    }

    /// Drain mode: recover orphans, then execute until the queue stops
    /// yielding or the cap is reached. Returns tasks executed.
    pub async fn run_once(&mut self, max_tasks: Option<usize>) -> usize {
        let mode = if self.dry_run { "dry-run" } else { "drain" };
        info!(worker_id = %self.worker_id, mode, "Executor starting");
        self.started = Some(Instant::now());
        self.with_stats(|s| s.started_at = Some(now_ts()));

        self.recover_orphans();

        let mut total = 0;
        loop {
            if let Some(cap) = max_tasks {
                if total >= cap {
                    info!(cap, "Reached task limit");
                    break;
                }
            }
            let remaining = max_tasks.map(|cap| cap - total);
            let executed = self.poll_and_execute(remaining).await;
            total += executed;

            if executed == 0 || self.shutdown_requested() {
                break;
            }
            // Dry-run releases every task back to pending; a second pass
            // would pick the same rows up again.
            if self.dry_run {
                break;
            }
        }

        self.release_current("daemon_exit");
        info!(total, "Drain complete");
        self.log_stats();
        total
    }

    /// Continuous mode: heartbeat, leader election, periodic orphan
    /// sweeps, poll loop until shutdown.
    pub async fn run_daemon(&mut self) {
        info!(worker_id = %self.worker_id, "Executor starting (continuous)");
        self.started = Some(Instant::now());
        self.with_stats(|s| s.started_at = Some(now_ts()));

        self.recover_orphans();

        let heartbeat = heartbeat::spawn_heartbeat(
            self.store.path().to_path_buf(),
            self.worker_id.clone(),
            Duration::from_secs(self.config.heartbeat_interval_secs),
            Arc::clone(&self.stats),
            self.shutdown.clone(),
        );

        // Election errors leave the worker in standby for this cycle.
        self.is_leader = heartbeat::attempt_leader_election(&self.store, &self.worker_id, self.config.leader_ttl_secs)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Leader election failed, standing by");
                false
            });
        if !self.is_leader {
            info!("Not leader on startup; standing by with periodic election attempts");
        }

        let mut last_orphan_check = Instant::now();

        while !self.shutdown_requested() {
            if self.reload.swap(false, Ordering::SeqCst) {
                self.config.apply_env();
                info!("Configuration reloaded from environment");
            }

            if self.is_leader {
                self.poll_and_execute(None).await;
            } else {
                match heartbeat::attempt_leader_election(&self.store, &self.worker_id, self.config.leader_ttl_secs) {
                    Ok(true) => {
                        self.is_leader = true;
                        info!("Promoted to leader; resuming task execution");
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Leader election failed, staying standby"),
                }
            }

            if last_orphan_check.elapsed() >= Duration::from_secs(self.config.orphan_check_interval_secs) {
                self.recover_orphans();
                last_orphan_check = Instant::now();
            }

            let consecutive = self.with_stats(|s| s.consecutive_errors);
            if consecutive >= self.config.max_consecutive_errors {
                error!(
                    consecutive,
                    "Too many consecutive errors, pausing for extended cooldown"
                );
                self.sleep_or_shutdown(Duration::from_secs(self.config.max_backoff_secs)).await;
                self.with_stats(|s| s.consecutive_errors = 0);
            }

            self.sleep_or_shutdown(Duration::from_secs(self.config.poll_interval_secs)).await;
        }

        self.release_current("daemon_exit");
        info!("Executor daemon stopped");
        self.log_stats();
        let _ = heartbeat.await;
    }

    async fn sleep_or_shutdown(&mut self, duration: Duration) {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = shutdown.changed() => {}
        }
    }

    /// Release the in-flight claim, if any. Called at every exit path.
    pub fn release_current(&mut self, reason: &str) {
        if let Some(action_id) = self.current_task.take() {
            warn!(action_id, reason, "Releasing uncompleted task on exit");
            if let Err(e) = self.store.release(&action_id, reason, 0) {
                error!(action_id, error = %e, "Failed to release task on exit");
            }
        }
    }

    /// Structured health snapshot with live queue counters.
    pub fn health_snapshot(&self) -> queuestore::Result<HealthSnapshot> {
        Ok(HealthSnapshot {
            state: if self.started.is_some() { "running" } else { "stopped" }.to_string(),
            worker_id: self.worker_id.clone(),
            uptime_seconds: self.started.map_or(0.0, |t| t.elapsed().as_secs_f64()),
            current_task: self.current_task.clone(),
            stats: self.with_stats(|s| s.clone()),
            queue: self.store.queue_counters()?,
        })
    }

    fn log_stats(&self) {
        let stats = self.with_stats(|s| s.clone());
        info!(
            executed = stats.tasks_executed,
            succeeded = stats.tasks_succeeded,
            failed = stats.tasks_failed,
            retried = stats.tasks_retried,
            skipped = stats.tasks_skipped,
            orphans = stats.orphans_recovered,
            "Executor statistics"
        );
    }
}

impl Drop for ExecutorDaemon {
    fn drop(&mut self) {
        self.release_current("daemon_exit");
    }
}
