//! Cycle driver
//!
//! One cycle runs generators, registers their documents, extracts
//! insights into tasks, dispatches the executor (detached daemon or
//! inline drain), and publishes. The optional wait loop keeps turning
//! the crank until a full iteration produces nothing new: no ready or
//! in-flight tasks, no publications, no fresh insights.

pub mod generators;
pub mod insights;

pub use generators::ReportGenerator;
pub use insights::InsightsExtractor;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::{Context, Result};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use queuestore::{Datastore, Toggle};

use crate::config::Config;
use crate::executor::{ExecutorDaemon, process};
use crate::fingerprint::fingerprint;
use crate::frontmatter;
use crate::handlers::{HandlerContext, HandlerRegistry};
use crate::llm::{HttpLlmClient, LlmClient, LlmError};
use crate::publisher::{PublishError, PublishReport, Publisher, RemoteTarget, RestRemote};

/// How long `run_cycle` keeps working after the first pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Single pass.
    None,
    /// Loop until converged or the timeout elapses.
    Bounded(Duration),
    /// Loop until converged.
    Forever,
}

/// What one cycle accomplished
#[derive(Debug, Default, Clone, Serialize)]
pub struct CycleReport {
    pub generated: usize,
    pub registered: usize,
    pub actions_created: usize,
    pub executed: usize,
    pub published: usize,
    pub wait_iterations: usize,
    pub converged: bool,
}

/// The cycle orchestrator
pub struct Orchestrator {
    config: Config,
    store: Datastore,
    generators: Vec<Box<dyn ReportGenerator>>,
    llm: Option<Arc<dyn LlmClient>>,
    remote: Option<Arc<dyn RemoteTarget>>,
    /// Seconds between wait-loop iterations.
    wait_poll_secs: u64,
}

impl Orchestrator {
    /// Build the orchestrator: open the store, apply toggle overrides,
    /// and probe the external collaborators once.
    pub fn new(config: Config) -> Result<Self> {
        let store = Datastore::open(config.store_path()).context("Failed to open store")?;
        config.apply_toggle_env(&store)?;

        let llm: Option<Arc<dyn LlmClient>> = match HttpLlmClient::from_config(&config.llm) {
            Ok(client) => Some(Arc::new(client)),
            Err(LlmError::NotConfigured(msg)) => {
                info!(%msg, "No LLM provider; AI tasks will be skipped");
                None
            }
            Err(e) => {
                warn!(error = %e, "LLM provider unavailable");
                None
            }
        };

        let remote: Option<Arc<dyn RemoteTarget>> = match RestRemote::from_env(&config.publisher) {
            Ok(remote) => Some(Arc::new(remote)),
            Err(PublishError::NotConfigured(msg)) => {
                info!(%msg, "Remote target not configured; publishing will be skipped");
                None
            }
            Err(e) => {
                warn!(error = %e, "Remote target unavailable");
                None
            }
        };

        Ok(Self {
            config,
            store,
            generators: Vec::new(),
            llm,
            remote,
            wait_poll_secs: 2,
        })
    }

    /// Register a generator.
    pub fn with_generator(mut self, generator: Box<dyn ReportGenerator>) -> Self {
        self.generators.push(generator);
        self
    }

    /// Override the remote target (tests).
    pub fn with_remote(mut self, remote: Arc<dyn RemoteTarget>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Override the LLM provider (tests).
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn store(&mut self) -> &mut Datastore {
        &mut self.store
    }

    /// Run one full cycle.
    pub async fn run_cycle(&mut self, force_inline: bool, wait: WaitMode) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        // 1. Generators, gated by schedule and existing content.
        let written = self.run_generators().await?;
        report.generated = written.len();

        // 2. Lifecycle registration with header-derived status.
        report.registered = self.register_documents(&written)?;

        // 3. Insights -> tasks (daily gate).
        report.actions_created = self.run_insights(false).await;

        // 4. Task execution.
        if self.store.is_enabled(Toggle::TaskExecution)? {
            let counters = self.store.queue_counters()?;
            if counters.stuck_in_progress > 0 {
                warn!(stuck = counters.stuck_in_progress, "Stuck tasks detected, recovering");
                self.store.reset_stuck(self.config.executor.orphan_timeout_hours)?;
            }
            info!(
                ready = counters.ready_now,
                scheduled = counters.scheduled_future,
                "Queue status"
            );

            if self.config.executor.detached && !force_inline {
                self.spawn_or_fallback(&mut report).await;
            } else {
                report.executed += self.execute_inline().await;
            }
        } else {
            info!("Task execution disabled via toggle");
        }

        // 5. Publish, then optionally wait for convergence.
        report.published += self.publish_once().await.published;

        match wait {
            WaitMode::None => {}
            WaitMode::Bounded(timeout) => {
                let converged = self.wait_until_converged(&mut report, Some(timeout)).await?;
                report.converged = converged;
            }
            WaitMode::Forever => {
                self.wait_until_converged(&mut report, None).await?;
                report.converged = true;
            }
        }

        info!(?report, "Cycle complete");
        Ok(report)
    }

    async fn run_generators(&mut self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for generator in &self.generators {
            if !self.store.should_run(generator.schedule_key())? {
                continue;
            }
            if generator.already_exists(&self.store)? {
                info!(generator = generator.name(), "Output already exists, skipping");
                continue;
            }
            match generator.generate(&self.config.paths.output_dir).await {
                Ok(paths) => {
                    info!(generator = generator.name(), files = paths.len(), "Generator finished");
                    self.store.mark_run(generator.schedule_key())?;
                    written.extend(paths);
                }
                Err(e) => warn!(generator = generator.name(), error = %e, "Generator failed"),
            }
        }
        Ok(written)
    }

    /// Ensure each produced document carries a header and a lifecycle row.
    fn register_documents(&mut self, paths: &[PathBuf]) -> Result<usize> {
        let mut registered = 0;
        for path in paths {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read generated file");
                    continue;
                }
            };

            let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let content = if frontmatter::has_frontmatter(&content) {
                content
            } else {
                let updated = frontmatter::add_frontmatter(&content, &file_name, None, self.llm.is_some());
                std::fs::write(path, &updated)
                    .with_context(|| format!("Failed to write header to {}", path.display()))?;
                updated
            };

            let status = frontmatter::document_status(&content);
            let doc_type = frontmatter::detect_type(&file_name);
            self.store
                .register_document(path, doc_type, status, Some(&fingerprint(&content)))?;
            registered += 1;
        }
        Ok(registered)
    }

    async fn run_insights(&mut self, ignore_schedule: bool) -> usize {
        let extractor = InsightsExtractor::new(
            self.llm.clone(),
            Duration::from_secs(self.config.executor.llm_timeout_secs),
        );
        let reports_dir = self.config.paths.output_dir.clone();
        match extractor.run(&self.store, &reports_dir, ignore_schedule).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Insights extraction failed");
                0
            }
        }
    }

    async fn spawn_or_fallback(&mut self, report: &mut CycleReport) {
        let execd = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("execd")))
            .filter(|path| path.exists());

        match execd {
            Some(exe) => match process::spawn_daemon(&exe, None) {
                Ok(pid) => {
                    info!(pid, "Task execution delegated to detached executor");
                }
                Err(e) => {
                    warn!(error = %e, "Spawn failed, falling back to inline execution");
                    report.executed += self.execute_inline().await;
                }
            },
            None => {
                warn!("execd binary not found, falling back to inline execution");
                report.executed += self.execute_inline().await;
            }
        }
    }

    /// Drain ready tasks in this process, under the same claim/release
    /// discipline the daemon uses.
    async fn execute_inline(&mut self) -> usize {
        let store = match Datastore::open(self.config.store_path()) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Cannot open store for inline execution");
                return 0;
            }
        };
        let ctx = HandlerContext {
            output_dir: self.config.paths.output_dir.clone(),
            llm: self.llm.clone(),
            llm_timeout: Duration::from_secs(self.config.executor.llm_timeout_secs),
        };
        let (_tx, rx) = watch::channel(false);
        let mut daemon = ExecutorDaemon::new(
            store,
            HandlerRegistry::builtin(),
            ctx,
            self.config.executor.clone(),
            rx,
        )
        .with_worker_id(format!("{}-inline", crate::executor::default_worker_id()));

        daemon.run_once(None).await
    }

    async fn publish_once(&mut self) -> PublishReport {
        let Some(remote) = self.remote.clone() else {
            // Not-configured is logged once per cycle, not per file.
            info!("Publishing skipped: remote target not configured");
            return PublishReport {
                not_configured: true,
                ..Default::default()
            };
        };
        let publisher = Publisher::new(remote);
        let output_dir = self.config.paths.output_dir.clone();
        publisher.run_pass(&mut self.store, &output_dir).await
    }

    /// Re-run execute/publish/insights until a full iteration changes
    /// nothing. Returns true when converged (vs timed out).
    async fn wait_until_converged(&mut self, report: &mut CycleReport, timeout: Option<Duration>) -> Result<bool> {
        let started = Instant::now();
        loop {
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    warn!("Wait loop timed out; tasks may remain");
                    return Ok(false);
                }
            }
            report.wait_iterations += 1;

            let counters = self.store.queue_counters()?;
            let mut executed = 0;
            if counters.ready_now > 0 && self.store.is_enabled(Toggle::TaskExecution)? {
                executed = self.execute_inline().await;
                report.executed += executed;
            }

            let publish = self.publish_once().await;
            report.published += publish.published;

            let new_actions = self.run_insights(true).await;
            report.actions_created += new_actions;

            let counters = self.store.queue_counters()?;
            let stats = self.store.task_stats()?;
            if counters.ready_now == 0
                && stats.in_progress == 0
                && publish.published == 0
                && new_actions == 0
            {
                info!(
                    iterations = report.wait_iterations,
                    executed, "Nothing left to do; wait loop converged"
                );
                return Ok(true);
            }

            tokio::time::sleep(Duration::from_secs(self.wait_poll_secs)).await;
        }
    }
}
