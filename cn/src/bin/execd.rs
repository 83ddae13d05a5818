//! execd - standalone task executor daemon
//!
//! Runs independently of the orchestrator, draining the shared task
//! queue. Normal completion (including an empty queue) exits 0; setup
//! failures exit non-zero.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use conductor::config::Config;
use conductor::executor::cli::ExecutorCli;
use conductor::executor::{ExecutorDaemon, process};
use conductor::handlers::{HandlerContext, HandlerRegistry};
use conductor::llm::{HttpLlmClient, LlmClient, LlmError};
use conductor::logging;
use queuestore::Datastore;

fn build_llm(config: &Config) -> Option<Arc<dyn LlmClient>> {
    match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => Some(Arc::new(client)),
        Err(LlmError::NotConfigured(msg)) => {
            info!(%msg, "No LLM provider; AI tasks will be skipped");
            None
        }
        Err(e) => {
            warn!(error = %e, "LLM provider unavailable");
            None
        }
    }
}

fn handler_context(config: &Config) -> HandlerContext {
    HandlerContext {
        output_dir: config.paths.output_dir.clone(),
        llm: build_llm(config),
        llm_timeout: Duration::from_secs(config.executor.llm_timeout_secs),
    }
}

/// Signal wiring: SIGTERM/SIGINT flip the shutdown flag; SIGHUP requests
/// a config reload without interrupting the current task.
fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>, reload: Arc<AtomicBool>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Cannot install SIGTERM handler");
                return;
            }
        };
        let mut int = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Cannot install SIGINT handler");
                return;
            }
        };
        let mut hup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Cannot install SIGHUP handler");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = term.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    let _ = shutdown_tx.send(true);
                }
                _ = int.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    let _ = shutdown_tx.send(true);
                }
                _ = hup.recv() => {
                    info!("Received SIGHUP, scheduling configuration reload");
                    reload.store(true, Ordering::SeqCst);
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ExecutorCli::parse();
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(poll) = cli.poll_interval {
        config.executor.poll_interval_secs = poll;
    }

    let log_dir = cli
        .log_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.paths.log_dir.clone());
    let _log_guard = logging::init(Some(&log_dir), "executor.log", cli.verbose)?;

    // Supervise runs before any store access; children do their own setup.
    if cli.supervise {
        return process::supervise(cli.log_file.as_deref(), cli.verbose);
    }

    let store = Datastore::open(config.store_path()).context("Failed to open store")?;
    config.apply_toggle_env(&store)?;

    if cli.spawn {
        if process::is_executor_running(&store) {
            println!("Executor daemon already running");
            return Ok(());
        }
        let pid = process::spawn_detached(cli.log_file.as_deref())?;
        println!("Spawned executor daemon with PID: {pid}");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut daemon = ExecutorDaemon::new(
        store,
        HandlerRegistry::builtin(),
        handler_context(&config),
        config.executor.clone(),
        shutdown_rx,
    )
    .with_dry_run(cli.dry_run);

    if cli.health {
        let snapshot = daemon.health_snapshot()?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    if cli.recover_orphans {
        let count = daemon.recover_orphans();
        println!("Recovered {count} orphaned tasks");
        return Ok(());
    }

    spawn_signal_listener(shutdown_tx, daemon.reload_flag());

    if cli.daemon {
        daemon.run_daemon().await;
    } else {
        // Default mode (and --once): drain the queue and exit.
        daemon.run_once(cli.max_tasks).await;
    }

    Ok(())
}
