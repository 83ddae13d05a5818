//! Generator interface and period keys
//!
//! Generators are external collaborators: the orchestrator only needs a
//! name, a schedule key, an exists-already probe against the content
//! registry, and a call that writes files and returns their paths.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};

use queuestore::Datastore;

/// An external document generator
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Generator name for logs.
    fn name(&self) -> &str;

    /// Schedule-tracker key gating this generator.
    fn schedule_key(&self) -> &str;

    /// Whether this period's output already exists in the content
    /// registry; a crashed cycle must not regenerate finished content.
    fn already_exists(&self, store: &Datastore) -> queuestore::Result<bool>;

    /// Produce the documents, returning every path written.
    async fn generate(&self, output_dir: &Path) -> eyre::Result<Vec<PathBuf>>;
}

/// `YYYY-MM-DD` for the given instant.
pub fn day_period(now: DateTime<Utc>) -> String {
    now.date_naive().to_string()
}

/// `YYYY-Www` ISO-week period key.
pub fn week_period(now: DateTime<Utc>) -> String {
    let iso = now.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

/// `YYYY-MM` month period key.
pub fn month_period(now: DateTime<Utc>) -> String {
    format!("{}-{:02}", now.year(), now.month())
}

/// `YYYY` year period key.
pub fn year_period(now: DateTime<Utc>) -> String {
    now.year().to_string()
}
