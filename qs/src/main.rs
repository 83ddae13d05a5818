//! qs - operator CLI for the conductor store

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use std::path::PathBuf;

use queuestore::Datastore;
use queuestore::cli::{Cli, Command};

/// Resolve the store path: flag, then env, then the local-data default.
fn resolve_store_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(dir) = std::env::var("CONDUCTOR_DATA_DIR") {
        return PathBuf::from(dir).join("conductor.db");
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("conductor")
        .join("conductor.db")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = resolve_store_path(cli.store.clone());
    let store = Datastore::open(&path).context("Failed to open store")?;

    match cli.command {
        Command::Health => {
            let health = store.system_health()?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::Queue { limit } => {
            let tasks = store.ready_tasks(Some(limit))?;
            if tasks.is_empty() {
                println!("No ready tasks");
            }
            for task in tasks {
                println!(
                    "{} [{}] {} {}",
                    task.action_id.cyan(),
                    task.priority.to_string().yellow(),
                    task.action_type,
                    task.title
                );
            }
        }
        Command::Scheduled => {
            let tasks = store.scheduled_tasks()?;
            if tasks.is_empty() {
                println!("No scheduled tasks");
            }
            for task in tasks {
                println!(
                    "{} due {} {}",
                    task.action_id.cyan(),
                    task.scheduled_for.as_deref().unwrap_or("-").dimmed(),
                    task.title
                );
            }
        }
        Command::Schedules => {
            for entry in store.schedule_status()? {
                let due = if entry.should_run {
                    "due".green()
                } else {
                    "waiting".dimmed()
                };
                let enabled = if entry.enabled { "" } else { " (disabled)" };
                println!(
                    "{:<28} {:<8} {} last={}{}",
                    entry.task_name,
                    entry.frequency,
                    due,
                    entry.last_run.as_deref().unwrap_or("never"),
                    enabled.red()
                );
            }
        }
        Command::Lifecycle { status } => {
            let status = status
                .parse()
                .map_err(|e: String| eyre::eyre!(e))
                .context("Invalid status")?;
            for record in store.documents_by_status(status)? {
                println!(
                    "{} v{} {} {}",
                    record.status.to_string().yellow(),
                    record.version,
                    record.doc_type.dimmed(),
                    record.file_path
                );
            }
        }
        Command::ConfigGet { key } => match store.get_config(&key)? {
            Some(value) => println!("{}", value),
            None => {
                println!("{}", "(unset)".dimmed());
            }
        },
        Command::ConfigSet { key, value } => {
            store.set_config(&key, &value, None)?;
            println!("{} {} = {}", "✓".green(), key.cyan(), value);
        }
    }

    Ok(())
}
