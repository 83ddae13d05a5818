//! Remote publishing target
//!
//! The core does not care what sits on the other end; it needs a
//! create-or-update call returning a remote id. Missing credentials are
//! a typed outcome so the caller can log "not configured" once per cycle
//! instead of failing every file.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::PublisherConfig;

/// Result of one remote write
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub remote_id: String,
    pub remote_url: Option<String>,
    /// True when the entry was created rather than updated.
    pub created: bool,
}

/// Errors from the publishing path
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("remote target not configured: {0}")]
    NotConfigured(String),

    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] queuestore::StoreError),
}

/// A create-or-update publishing endpoint
#[async_trait]
pub trait RemoteTarget: Send + Sync {
    /// Target name for logs.
    fn name(&self) -> &str;

    /// Create or update the remote entry for a document.
    async fn sync(&self, path: &Path, content: &str, doc_type: &str) -> Result<SyncOutcome, PublishError>;
}

/// REST implementation posting documents to a configured endpoint
pub struct RestRemote {
    base_url: String,
    token: String,
    http: Client,
}

#[derive(Deserialize)]
struct RemoteResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    created: bool,
}

impl RestRemote {
    /// Build the client from the environment variables named in config.
    /// Either variable missing is the typed not-configured outcome.
    pub fn from_env(config: &PublisherConfig) -> Result<Self, PublishError> {
        let base_url = std::env::var(&config.remote_url_env)
            .map_err(|_| PublishError::NotConfigured(format!("{} not set", config.remote_url_env)))?;
        let token = std::env::var(&config.remote_token_env)
            .map_err(|_| PublishError::NotConfigured(format!("{} not set", config.remote_token_env)))?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(PublishError::Network)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }
}

#[async_trait]
impl RemoteTarget for RestRemote {
    fn name(&self) -> &str {
        "rest"
    }

    async fn sync(&self, path: &Path, content: &str, doc_type: &str) -> Result<SyncOutcome, PublishError> {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string());
        debug!(%title, doc_type, "Publishing to remote");

        let body = serde_json::json!({
            "title": title,
            "doc_type": doc_type,
            "content": content,
            "source_path": path.to_string_lossy(),
        });

        let response = self
            .http
            .post(format!("{}/documents", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Remote {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: RemoteResponse = response.json().await?;
        Ok(SyncOutcome {
            remote_id: parsed.id,
            remote_url: parsed.url,
            created: parsed.created,
        })
    }
}
