//! CLI argument parsing for the qs inspection tool

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qs")]
#[command(author, version, about = "Inspect the conductor task/lifecycle store", long_about = None)]
pub struct Cli {
    /// Path to the store file (default: $CONDUCTOR_DATA_DIR/conductor.db)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the full health snapshot as JSON
    Health,

    /// List tasks that are ready to execute now
    Queue {
        /// Maximum rows to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List tasks scheduled for the future
    Scheduled,

    /// Show schedule tracker status
    Schedules,

    /// List lifecycle records by status
    Lifecycle {
        /// Status to filter on (draft, in_progress, review, published, archived)
        #[arg(required = true)]
        status: String,
    },

    /// Read a config value
    ConfigGet {
        #[arg(required = true)]
        key: String,
    },

    /// Write a config value
    ConfigSet {
        #[arg(required = true)]
        key: String,

        #[arg(required = true)]
        value: String,
    },
}
