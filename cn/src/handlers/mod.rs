//! Action-type handler registry
//!
//! Each task's `action_type` selects a handler. Handlers report failure
//! through a tagged error, so the executor's retry policy branches on a
//! classification rather than on exception text; the one remaining
//! string match (the quota pattern set) lives in the executor itself.

pub mod llm_task;
pub mod local_task;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use queuestore::{ActionType, Task};

use crate::llm::{LlmClient, LlmError};

/// Tagged handler failure driving the executor's retry policy
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Provider quota or rate limit; released with exponential backoff.
    #[error("quota exhausted: {0}")]
    Quota(String),

    /// Transient failure; released for retry until the retry cap.
    #[error("{0}")]
    Retriable(String),

    /// Malformed input or unknown action type; failed immediately.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// The task cannot run in this deployment (e.g. no LLM provider);
    /// parked as skipped rather than failed.
    #[error("skipped: {0}")]
    Skipped(String),
}

impl From<LlmError> for HandlerError {
    fn from(e: LlmError) -> Self {
        if e.is_rate_limit() {
            HandlerError::Quota(e.to_string())
        } else if e.is_retryable() {
            HandlerError::Retriable(e.to_string())
        } else if matches!(e, LlmError::NotConfigured(_)) {
            HandlerError::Skipped(e.to_string())
        } else {
            HandlerError::Permanent(e.to_string())
        }
    }
}

/// Successful handler result
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    /// Summary stored in the task's result column.
    pub result_data: String,
    /// Files the handler wrote.
    pub artifacts: Vec<PathBuf>,
}

/// Shared state handed to every handler invocation
pub struct HandlerContext {
    /// Directory artifacts are written into.
    pub output_dir: PathBuf,
    /// LLM provider, when configured.
    pub llm: Option<Arc<dyn LlmClient>>,
    /// Wall-clock budget for one LLM call.
    pub llm_timeout: Duration,
}

/// A handler for one action type
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The action type this handler serves.
    fn action_type(&self) -> ActionType;

    /// Execute the task.
    async fn execute(&self, task: &Task, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError>;
}

/// Registry mapping action types to handlers, populated at startup
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler installed.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for action in [ActionType::Research, ActionType::Insights, ActionType::Generate] {
            registry.register(Arc::new(llm_task::LlmTaskHandler::new(action)));
        }
        for action in [
            ActionType::Monitoring,
            ActionType::DataFetch,
            ActionType::Calculation,
            ActionType::CodeExploration,
        ] {
            registry.register(Arc::new(local_task::LocalTaskHandler::new(action)));
        }
        registry
    }

    /// Install a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers
            .insert(handler.action_type().as_str().to_string(), handler);
    }

    /// Look up the handler for an action type.
    pub fn get(&self, action_type: &ActionType) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(action_type.as_str())
    }

    /// Dispatch a task to its handler. An unknown action type is a
    /// permanent failure.
    pub async fn execute(&self, task: &Task, ctx: &HandlerContext) -> Result<HandlerOutcome, HandlerError> {
        match self.get(&task.action_type) {
            Some(handler) => handler.execute(task, ctx).await,
            None => Err(HandlerError::Permanent(format!(
                "unknown action type: {}",
                task.action_type
            ))),
        }
    }
}
