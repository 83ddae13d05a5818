//! Insights extraction
//!
//! Turns finished reports into queued tasks. With an LLM the extraction
//! asks for a JSON action list; without one it falls back to scanning
//! for open checkbox items. Extraction is idempotent per (title, source
//! report), so the orchestrator's convergence loop can re-run it freely.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use queuestore::{Datastore, NewTask, Priority, Toggle};

use crate::llm::LlmClient;

/// Schedule-tracker key for the daily extraction gate.
const SCHEDULE_KEY: &str = "insights_extraction";

/// One extracted work item before it becomes a task
#[derive(Debug, Clone, Deserialize)]
struct ActionDraft {
    #[serde(default = "default_action_type")]
    action_type: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
}

fn default_action_type() -> String {
    "research".to_string()
}

/// Extracts actionable work items from reports
pub struct InsightsExtractor {
    llm: Option<Arc<dyn LlmClient>>,
    llm_timeout: Duration,
}

impl InsightsExtractor {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, llm_timeout: Duration) -> Self {
        Self { llm, llm_timeout }
    }

    /// Run one extraction pass. Returns the number of tasks created.
    ///
    /// Gated by the insights toggle and (unless `ignore_schedule`) the
    /// daily schedule slot.
    pub async fn run(&self, store: &Datastore, reports_dir: &Path, ignore_schedule: bool) -> eyre::Result<usize> {
        if !store.is_enabled(Toggle::InsightsExtraction)? {
            info!("Insights extraction disabled via toggle");
            return Ok(0);
        }
        if !ignore_schedule && !store.should_run(SCHEDULE_KEY)? {
            debug!("Insights extraction already ran today");
            return Ok(0);
        }

        let mut created = 0;
        for entry in WalkDir::new(reports_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
        {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            // Task artifacts are outputs, not inputs.
            if name.contains("act-") {
                continue;
            }

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Unreadable report");
                    continue;
                }
            };

            let source = entry.file_name().to_string_lossy().into_owned();
            let drafts = self.extract(&content).await;
            for draft in drafts {
                if store.has_task_for_source(&draft.title, &source)? {
                    continue;
                }
                let action_id = next_action_id(store)?;
                let priority = draft
                    .priority
                    .as_deref()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(Priority::Medium);

                let mut task = NewTask::new(&action_id, draft.action_type.as_str(), &draft.title)
                    .with_priority(priority)
                    .with_source(&source, first_lines(&content, 10));
                task.description = draft.description;
                store.enqueue(&task)?;
                created += 1;
                debug!(action_id, title = %task.title, "Task created from report");
            }
        }

        if !ignore_schedule {
            store.mark_run(SCHEDULE_KEY)?;
        }
        if created > 0 {
            info!(created, "Insights extraction produced new tasks");
        }
        Ok(created)
    }

    async fn extract(&self, content: &str) -> Vec<ActionDraft> {
        if let Some(llm) = &self.llm {
            let prompt = format!(
                "Extract actionable follow-up items from this report. Respond with ONLY a \
                 JSON array of objects with fields: action_type (one of research, monitoring, \
                 data_fetch, calculation, code_exploration, insights, generate), title, \
                 description, priority (critical, high, medium, low).\n\nReport:\n{content}"
            );
            match tokio::time::timeout(self.llm_timeout, llm.generate(&prompt)).await {
                Ok(Ok(completion)) => return parse_llm_actions(&completion.text),
                Ok(Err(e)) => warn!(error = %e, "LLM extraction failed, using heuristic"),
                Err(_) => warn!("LLM extraction timed out, using heuristic"),
            }
        }
        heuristic_extract(content)
    }
}

/// Next sequential action id for today: `ACT-YYYYMMDD-NNNN`.
pub fn next_action_id(store: &Datastore) -> queuestore::Result<String> {
    let prefix = format!("ACT-{}-", Utc::now().format("%Y%m%d"));
    let next = match store.latest_action_id(&prefix)? {
        Some(latest) => latest
            .rsplit('-')
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .map_or(1, |n| n + 1),
        None => 1,
    };
    Ok(format!("{prefix}{next:04}"))
}

/// Pull a JSON array out of the completion, tolerating prose around it.
fn parse_llm_actions(text: &str) -> Vec<ActionDraft> {
    let Some(start) = text.find('[') else {
        return Vec::new();
    };
    let Some(end) = text.rfind(']') else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }
    serde_json::from_str(&text[start..=end]).unwrap_or_else(|e| {
        warn!(error = %e, "Unparseable action list from LLM");
        Vec::new()
    })
}

/// Checkbox scan used when no LLM is available.
fn heuristic_extract(content: &str) -> Vec<ActionDraft> {
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let title = trimmed
                .strip_prefix("- [ ] ")
                .or_else(|| trimmed.strip_prefix("* [ ] "))
                .or_else(|| trimmed.strip_prefix("ACTION: "))?;
            let title = title.trim();
            (!title.is_empty()).then(|| ActionDraft {
                action_type: "research".to_string(),
                title: title.to_string(),
                description: None,
                priority: None,
            })
        })
        .collect()
}

fn first_lines(content: &str, n: usize) -> String {
    content.lines().take(n).collect::<Vec<_>>().join("\n")
}
