//! Local handlers (monitoring, data_fetch, calculation, code_exploration)
//!
//! These action types need no LLM: they record a structured work order as
//! a markdown artifact for the downstream collector. The artifact file
//! names match the publisher's exclusion patterns, so they stay internal.

use async_trait::async_trait;
use tracing::info;

use queuestore::{ActionType, Task, now_ts};

use super::{HandlerContext, HandlerError, HandlerOutcome, TaskHandler};

/// Handler for action types executed without a provider
pub struct LocalTaskHandler {
    action: ActionType,
}

impl LocalTaskHandler {
    pub fn new(action: ActionType) -> Self {
        Self { action }
    }

    fn file_prefix(&self) -> &'static str {
        match self.action {
            ActionType::Monitoring => "monitor",
            ActionType::DataFetch => "data_fetch",
            ActionType::Calculation => "calc",
            ActionType::CodeExploration => "code",
            _ => "task",
        }
    }
}

#[async_trait]
impl TaskHandler for LocalTaskHandler {
    fn action_type(&self) -> ActionType {
        self.action.clone()
    }

    async fn execute(&self, task: &Task, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        if task.title.trim().is_empty() {
            return Err(HandlerError::Permanent("task has an empty title".to_string()));
        }

        let file_name = format!("{}_{}.md", self.file_prefix(), task.action_id);
        let path = ctx.output_dir.join(&file_name);
        std::fs::create_dir_all(&ctx.output_dir)
            .map_err(|e| HandlerError::Retriable(format!("cannot create output dir: {e}")))?;

        let mut content = format!(
            "# {}\n\n- action_id: {}\n- action_type: {}\n- priority: {}\n- executed_at: {}\n",
            task.title,
            task.action_id,
            task.action_type,
            task.priority,
            now_ts(),
        );
        if let Some(description) = &task.description {
            content.push_str(&format!("\n{}\n", description));
        }
        if let Some(report) = &task.source_report {
            content.push_str(&format!("\nSource: {}\n", report));
        }

        std::fs::write(&path, content).map_err(|e| HandlerError::Retriable(format!("cannot write artifact: {e}")))?;

        info!(action_id = %task.action_id, artifact = %path.display(), "local task artifact written");
        Ok(HandlerOutcome {
            result_data: format!("recorded {}", file_name),
            artifacts: vec![path],
        })
    }
}
