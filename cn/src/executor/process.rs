//! Executor process management
//!
//! Spawning a detached daemon, checking for a live one via heartbeat
//! freshness, and the supervise loop that restarts a crashed daemon with
//! exponential backoff.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use eyre::{Context, Result};
use tracing::{info, warn};

use queuestore::{Datastore, now, parse_ts};

/// Supervisor restart backoff: initial one second, doubling to this cap.
const SUPERVISE_BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Heartbeats younger than this mean a live executor.
const HEARTBEAT_FRESHNESS: Duration = Duration::from_secs(120);

/// Spawn a detached executor daemon running `--daemon`. Returns its PID.
pub fn spawn_detached(log_file: Option<&Path>) -> Result<u32> {
    let exe = std::env::current_exe().context("Failed to get current executable")?;
    spawn_daemon(&exe, log_file)
}

/// Spawn `exe --daemon` detached from this process.
pub fn spawn_daemon(exe: &Path, log_file: Option<&Path>) -> Result<u32> {
    let mut cmd = Command::new(exe);
    cmd.arg("--daemon");
    if let Some(path) = log_file {
        cmd.arg("--log-file").arg(path);
    }
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

    // Survive the parent's death.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = cmd.spawn().context("Failed to spawn executor daemon")?;
    let pid = child.id();
    info!(pid, "Spawned detached executor daemon");
    Ok(pid)
}

/// Whether any executor heartbeat in the store is fresh.
pub fn is_executor_running(store: &Datastore) -> bool {
    let Ok(config) = store.all_config() else {
        return false;
    };
    for (key, value) in config {
        if !key.starts_with("executor_heartbeat_") {
            continue;
        }
        if let Ok(beat) = parse_ts(&value) {
            if (now() - beat).num_seconds() < HEARTBEAT_FRESHNESS.as_secs() as i64 {
                return true;
            }
        }
    }
    false
}

/// Run the supervise loop: spawn a child daemon, wait for it to exit,
/// restart after a backoff that doubles per crash up to the cap.
///
/// Runs until the supervisor itself is killed.
pub fn supervise(log_file: Option<&Path>, verbose: bool) -> Result<()> {
    let exe = std::env::current_exe().context("Failed to get current executable")?;
    let mut backoff = Duration::from_secs(1);

    loop {
        let mut cmd = Command::new(&exe);
        cmd.arg("--daemon");
        if let Some(path) = log_file {
            cmd.arg("--log-file").arg(path);
        }
        if verbose {
            cmd.arg("--verbose");
        }

        let mut child = cmd.spawn().context("Failed to spawn supervised daemon")?;
        info!(pid = child.id(), "Supervisor spawned child daemon");

        let status = child.wait().context("Failed to wait for supervised daemon")?;
        warn!(?status, "Supervised daemon exited, restarting in {:?}", backoff);

        std::thread::sleep(backoff);
        backoff = (backoff * 2).min(SUPERVISE_BACKOFF_CAP);
    }
}

/// Check if a process with the given PID is alive.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    // Signal 0 probes existence without affecting the process.
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    true
}
