//! LLM provider interface
//!
//! The executor's AI-backed handlers only need a synchronous-feeling
//! `generate(prompt) -> text` call; everything else (streaming, tool use)
//! is out of scope. Errors carry enough classification for the quota
//! retry policy.

pub mod client;
pub mod error;

pub use client::HttpLlmClient;
pub use error::LlmError;

use async_trait::async_trait;

/// A completed generation
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
}

/// Minimal LLM provider contract
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Generate a completion for a prompt.
    async fn generate(&self, prompt: &str) -> Result<Completion, LlmError>;
}
