//! CLI command definitions for the orchestrator

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Conductor - autonomous analysis-cycle orchestrator
#[derive(Parser)]
#[command(
    name = "cn",
    about = "Drives analysis cycles: generate, extract tasks, execute, publish",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one full cycle
    Run {
        /// Execute tasks in this process instead of spawning the daemon
        #[arg(long)]
        force_inline: bool,

        /// After the cycle, keep working until converged or N seconds pass
        #[arg(long, value_name = "SECONDS", conflicts_with = "wait_forever")]
        wait: Option<u64>,

        /// After the cycle, keep working until nothing is left to do
        #[arg(long)]
        wait_forever: bool,
    },

    /// Show the system health snapshot
    Status,

    /// Run one publishing pass
    Publish,

    /// Re-attempt failed or pending publications
    RetryPublishes,

    /// Run insights extraction now
    Insights {
        /// Ignore the daily schedule gate
        #[arg(long)]
        ignore_schedule: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::parse_from(["cn", "run"]);
        match cli.command {
            Command::Run {
                force_inline,
                wait,
                wait_forever,
            } => {
                assert!(!force_inline);
                assert!(wait.is_none());
                assert!(!wait_forever);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_wait_modes_conflict() {
        assert!(Cli::try_parse_from(["cn", "run", "--wait", "60", "--wait-forever"]).is_err());
    }

    #[test]
    fn test_parse_insights() {
        let cli = Cli::parse_from(["cn", "insights", "--ignore-schedule"]);
        assert!(matches!(cli.command, Command::Insights { ignore_schedule: true }));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["cn", "-c", "/etc/conductor.yml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/conductor.yml")));
    }
}
