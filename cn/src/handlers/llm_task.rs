//! LLM-backed handlers (research, insights, generate)
//!
//! These build a prompt from the task's title, description and source
//! context, call the provider under the configured timeout, and write the
//! completion as a markdown artifact named after the action id. Artifact
//! names carry the action id so the publisher's exclusion patterns keep
//! them off the remote target.

use async_trait::async_trait;
use tracing::info;

use queuestore::{ActionType, Task};

use super::{HandlerContext, HandlerError, HandlerOutcome, TaskHandler};
use crate::frontmatter;

/// Handler for action types that need a completion
pub struct LlmTaskHandler {
    action: ActionType,
}

impl LlmTaskHandler {
    pub fn new(action: ActionType) -> Self {
        Self { action }
    }

    fn build_prompt(&self, task: &Task) -> String {
        let mut prompt = match self.action {
            ActionType::Research => format!("Research the following and report findings.\n\nTopic: {}\n", task.title),
            ActionType::Insights => format!("Extract the key insights from the following item.\n\nItem: {}\n", task.title),
            _ => format!("Produce the requested document.\n\nRequest: {}\n", task.title),
        };
        if let Some(description) = &task.description {
            prompt.push_str(&format!("\nDetails: {}\n", description));
        }
        if let Some(context) = &task.source_context {
            prompt.push_str(&format!("\nSource context:\n{}\n", context));
        }
        prompt
    }
}

#[async_trait]
impl TaskHandler for LlmTaskHandler {
    fn action_type(&self) -> ActionType {
        self.action.clone()
    }

    async fn execute(&self, task: &Task, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        let Some(llm) = &ctx.llm else {
            return Err(HandlerError::Skipped("LLM provider not configured".to_string()));
        };

        let prompt = self.build_prompt(task);
        let completion = tokio::time::timeout(ctx.llm_timeout, llm.generate(&prompt))
            .await
            .map_err(|_| HandlerError::Retriable(format!("LLM call exceeded {:?}", ctx.llm_timeout)))??;

        let file_name = format!("{}_{}.md", self.action, task.action_id);
        let path = ctx.output_dir.join(&file_name);
        std::fs::create_dir_all(&ctx.output_dir)
            .map_err(|e| HandlerError::Retriable(format!("cannot create output dir: {e}")))?;

        let body = format!("# {}\n\n{}\n", task.title, completion.text);
        let content = frontmatter::add_frontmatter(&body, &file_name, Some("draft"), true);
        std::fs::write(&path, content).map_err(|e| HandlerError::Retriable(format!("cannot write artifact: {e}")))?;

        info!(action_id = %task.action_id, artifact = %path.display(), "LLM task artifact written");
        Ok(HandlerOutcome {
            result_data: format!("{} chars -> {}", completion.text.len(), file_name),
            artifacts: vec![path],
        })
    }
}
