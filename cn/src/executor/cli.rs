//! Executor daemon command-line interface
//!
//! Flag-style modes, mutually exclusive: exactly one of the mode flags
//! (or none, which drains once and exits).

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "execd",
    about = "Conductor task executor daemon",
    after_help = "Examples:\n  execd --daemon              # Run continuously\n  execd --once                # Drain queue and exit\n  execd --recover-orphans     # Recover stuck tasks only\n  execd --health              # Show health status\n  execd --spawn               # Spawn detached daemon"
)]
pub struct ExecutorCli {
    /// Run as continuous daemon
    #[arg(short = 'd', long, group = "mode")]
    pub daemon: bool,

    /// Run once (drain queue) and exit
    #[arg(short = '1', long, group = "mode")]
    pub once: bool,

    /// Recover orphaned tasks and exit
    #[arg(long, group = "mode")]
    pub recover_orphans: bool,

    /// Print a JSON health snapshot and exit
    #[arg(long, group = "mode")]
    pub health: bool,

    /// Spawn a detached executor daemon and exit
    #[arg(long, group = "mode")]
    pub spawn: bool,

    /// Supervise: restart the daemon on crash with backoff
    #[arg(long, group = "mode")]
    pub supervise: bool,

    /// Simulate execution without running handlers
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds between queue polls
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Log file directory override
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Maximum number of tasks to execute
    #[arg(long)]
    pub max_tasks: Option<usize>,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_daemon_short() {
        let cli = ExecutorCli::parse_from(["execd", "-d"]);
        assert!(cli.daemon);
        assert!(!cli.once);
    }

    #[test]
    fn test_parse_once_short() {
        let cli = ExecutorCli::parse_from(["execd", "-1"]);
        assert!(cli.once);
    }

    #[test]
    fn test_modes_are_exclusive() {
        assert!(ExecutorCli::try_parse_from(["execd", "--daemon", "--once"]).is_err());
        assert!(ExecutorCli::try_parse_from(["execd", "--spawn", "--health"]).is_err());
    }

    #[test]
    fn test_no_mode_is_valid() {
        let cli = ExecutorCli::parse_from(["execd"]);
        assert!(!cli.daemon && !cli.once && !cli.health);
    }

    #[test]
    fn test_tunables() {
        let cli = ExecutorCli::parse_from(["execd", "-d", "--poll-interval", "5", "--max-tasks", "3", "--dry-run"]);
        assert_eq!(cli.poll_interval, Some(5));
        assert_eq!(cli.max_tasks, Some(3));
        assert!(cli.dry_run);
    }
}
