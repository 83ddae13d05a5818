//! Worker heartbeat and leader election
//!
//! Heartbeats are config-table rows keyed by worker id; the leader is a
//! single `executor_leader` key holding `worker_id|timestamp`. Leadership
//! changes hands by TTL: a key older than the TTL is stolen outright.
//! Only the leader executes tasks; standbys keep heartbeating and try to
//! promote each poll cycle.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use queuestore::{Datastore, now, now_ts, parse_ts};

use super::ExecutorStats;

/// Config key holding the current leader.
pub const LEADER_KEY: &str = "executor_leader";

/// Config key for a worker's heartbeat timestamp.
pub fn heartbeat_key(worker_id: &str) -> String {
    format!("executor_heartbeat_{worker_id}")
}

/// Config key for a worker's serialized stats.
pub fn stats_key(worker_id: &str) -> String {
    format!("executor_stats_{worker_id}")
}

/// Write one heartbeat: timestamp plus serialized stats.
pub fn write_heartbeat(store: &Datastore, worker_id: &str, stats: &ExecutorStats) -> queuestore::Result<()> {
    store.set_config(&heartbeat_key(worker_id), &now_ts(), Some("Executor heartbeat"))?;
    let stats_json = serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string());
    store.set_config(&stats_key(worker_id), &stats_json, Some("Executor stats"))?;
    Ok(())
}

/// Try to become (or remain) the leader.
///
/// Empty key: take it. Own key: refresh the timestamp. Foreign key past
/// its TTL, or with an unreadable timestamp: steal it. Otherwise stand by.
pub fn attempt_leader_election(store: &Datastore, worker_id: &str, ttl_seconds: u64) -> queuestore::Result<bool> {
    let stamp = format!("{}|{}", worker_id, now_ts());

    let Some(current) = store.get_config(LEADER_KEY)? else {
        store.set_config(LEADER_KEY, &stamp, Some("Current executor leader"))?;
        info!(worker_id, "Became executor leader");
        return Ok(true);
    };

    let mut parts = current.splitn(2, '|');
    let holder = parts.next().unwrap_or_default();
    let held_at = parts.next().unwrap_or_default();

    if holder == worker_id {
        store.set_config(LEADER_KEY, &stamp, None)?;
        return Ok(true);
    }

    let stale = match parse_ts(held_at) {
        Ok(ts) => (now() - ts).num_seconds() >= ttl_seconds as i64,
        Err(_) => true,
    };
    if stale {
        store.set_config(LEADER_KEY, &stamp, None)?;
        info!(worker_id, previous = holder, "Stole executor leadership");
        return Ok(true);
    }

    debug!(worker_id, leader = holder, "Standing by, leader is alive");
    Ok(false)
}

/// Spawn the heartbeat task. It opens its own store handle and beats
/// until the shutdown flag flips; its errors are logged and swallowed.
pub fn spawn_heartbeat(
    store_path: PathBuf,
    worker_id: String,
    interval: Duration,
    stats: Arc<Mutex<ExecutorStats>>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let store = match Datastore::open(&store_path) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Heartbeat task could not open store, giving up");
                return;
            }
        };
        info!(worker_id, "Heartbeat task started");

        loop {
            let snapshot = stats.lock().map(|s| s.clone()).unwrap_or_default();
            if let Err(e) = write_heartbeat(&store, &worker_id, &snapshot) {
                warn!(error = %e, "Heartbeat write failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!(worker_id, "Heartbeat task stopping");
                        break;
                    }
                }
            }
        }
    })
}
