//! HTTP client for the messages-style completion API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Completion, LlmClient, LlmError};
use crate::config::LlmConfig;

/// HTTP-backed LLM provider
pub struct HttpLlmClient {
    provider: String,
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    timeout: Duration,
}

impl HttpLlmClient {
    /// Create a client from configuration.
    ///
    /// The API key comes from the environment variable named in config;
    /// a missing key is the typed not-configured outcome, which callers
    /// treat as "run without AI".
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| LlmError::NotConfigured(format!("environment variable {} not set", config.api_key_env)))?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            provider: config.provider.clone(),
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    fn parse_retry_after(response: &reqwest::Response) -> Duration {
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60))
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
}

#[derive(Deserialize)]
struct ApiContentBlock {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn generate(&self, prompt: &str) -> Result<Completion, LlmError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "LLM generate");

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Network(e)
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited {
                retry_after: Self::parse_retry_after(&response),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text: String = parsed.content.into_iter().map(|b| b.text).collect();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("empty completion".to_string()));
        }

        Ok(Completion { text })
    }
}
