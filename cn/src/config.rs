//! Conductor configuration types and loading
//!
//! Configuration comes from a YAML file found through a fallback chain
//! (explicit path, project-local, user config dir, defaults), then the
//! executor tunables are overlaid from the environment. Environment
//! always wins so a systemd unit can retune a deployed daemon without
//! touching its config file.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use queuestore::{Datastore, Toggle};

/// Main conductor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filesystem layout
    pub paths: PathsConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Executor daemon tunables
    pub executor: ExecutorConfig,

    /// Publisher / remote target configuration
    pub publisher: PublisherConfig,
}

impl Config {
    /// Load configuration with the fallback chain, then apply the
    /// environment overlay.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.executor.apply_env();
        config.paths.apply_env();
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".conductor.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("conductor").join("conductor.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Path of the shared store file.
    pub fn store_path(&self) -> PathBuf {
        self.paths.data_dir.join("conductor.db")
    }

    /// Push feature-toggle environment overrides into the store. Only
    /// toggles actually present in the environment are written.
    pub fn apply_toggle_env(&self, store: &Datastore) -> queuestore::Result<()> {
        const TOGGLE_ENV: &[(&str, Toggle)] = &[
            ("PUBLISHING_ENABLED", Toggle::Publishing),
            ("TASK_EXECUTION_ENABLED", Toggle::TaskExecution),
            ("INSIGHTS_EXTRACTION_ENABLED", Toggle::InsightsExtraction),
        ];
        for (var, toggle) in TOGGLE_ENV {
            if let Ok(value) = std::env::var(var) {
                let enabled = matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
                store.set_enabled(*toggle, enabled)?;
                tracing::info!(toggle = toggle.key(), enabled, "Applied toggle from environment");
            }
        }
        Ok(())
    }
}

/// Filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the store file
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Directory generators write documents into
    #[serde(rename = "output-dir")]
    pub output_dir: PathBuf,

    /// Directory for daemon log files
    #[serde(rename = "log-dir")]
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conductor");
        Self {
            output_dir: PathBuf::from("output"),
            log_dir: data_dir.join("logs"),
            data_dir,
        }
    }
}

impl PathsConfig {
    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("CONDUCTOR_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CONDUCTOR_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (informational)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Per-call wall-clock timeout in seconds (LLM_TIMEOUT overrides)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

/// Executor daemon tunables
///
/// Every field has an environment override read at startup and on
/// SIGHUP; see [`ExecutorConfig::apply_env`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Seconds between queue polls
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,

    /// Seconds between heartbeat writes
    #[serde(rename = "heartbeat-interval-secs")]
    pub heartbeat_interval_secs: u64,

    /// Hours before an in-progress task counts as orphaned
    #[serde(rename = "orphan-timeout-hours")]
    pub orphan_timeout_hours: u64,

    /// Seconds between orphan sweeps while running
    #[serde(rename = "orphan-check-interval-secs")]
    pub orphan_check_interval_secs: u64,

    /// Seconds a leader key stays valid before takeover
    #[serde(rename = "leader-ttl-secs")]
    pub leader_ttl_secs: u64,

    /// Maximum retries per task; -1 retries forever, 0 never retries
    #[serde(rename = "max-retries")]
    pub max_retries: i64,

    /// First quota backoff in seconds
    #[serde(rename = "initial-backoff-secs")]
    pub initial_backoff_secs: u64,

    /// Backoff ceiling in seconds; also the circuit-breaker pause
    #[serde(rename = "max-backoff-secs")]
    pub max_backoff_secs: u64,

    /// Consecutive failures before the worker pauses
    #[serde(rename = "max-consecutive-errors")]
    pub max_consecutive_errors: u64,

    /// Delay applied to non-quota retriable releases
    #[serde(rename = "retry-delay-secs")]
    pub retry_delay_secs: u64,

    /// Whether the orchestrator spawns a detached executor
    pub detached: bool,

    /// Per-call LLM timeout in seconds
    #[serde(rename = "llm-timeout-secs")]
    pub llm_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            heartbeat_interval_secs: 60,
            orphan_timeout_hours: 1,
            orphan_check_interval_secs: 300,
            leader_ttl_secs: 120,
            max_retries: 3,
            initial_backoff_secs: 30,
            max_backoff_secs: 600,
            max_consecutive_errors: 10,
            retry_delay_secs: 0,
            detached: false,
            llm_timeout_secs: 120,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, into: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse() {
            Ok(value) => *into = value,
            Err(_) => tracing::warn!(var, raw, "Ignoring unparseable environment override"),
        }
    }
}

impl ExecutorConfig {
    /// Overlay the documented environment variables. Called at startup
    /// and again on SIGHUP.
    pub fn apply_env(&mut self) {
        env_parse("EXECUTOR_POLL_INTERVAL", &mut self.poll_interval_secs);
        env_parse("EXECUTOR_HEARTBEAT_INTERVAL", &mut self.heartbeat_interval_secs);
        env_parse("EXECUTOR_ORPHAN_TIMEOUT_HOURS", &mut self.orphan_timeout_hours);
        env_parse("EXECUTOR_LEADER_TTL_SECONDS", &mut self.leader_ttl_secs);
        env_parse("MAX_RETRIES", &mut self.max_retries);
        env_parse("INITIAL_BACKOFF_SECONDS", &mut self.initial_backoff_secs);
        env_parse("MAX_BACKOFF_SECONDS", &mut self.max_backoff_secs);
        env_parse("MAX_CONSECUTIVE_ERRORS", &mut self.max_consecutive_errors);
        env_parse("LLM_TIMEOUT", &mut self.llm_timeout_secs);
        if let Ok(raw) = std::env::var("DETACHED_EXECUTOR") {
            self.detached = matches!(raw.as_str(), "1" | "true" | "yes" | "on");
        }
    }
}

/// Publisher / remote target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Environment variable carrying the remote API base URL
    #[serde(rename = "remote-url-env")]
    pub remote_url_env: String,

    /// Environment variable carrying the remote API token
    #[serde(rename = "remote-token-env")]
    pub remote_token_env: String,

    /// Publish attempts per document before the retry worker gives up
    #[serde(rename = "retry-cap")]
    pub retry_cap: i64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            remote_url_env: "PUBLISH_API_URL".to_string(),
            remote_token_env: "PUBLISH_API_TOKEN".to_string(),
            retry_cap: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.executor.poll_interval_secs, 30);
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.executor.initial_backoff_secs, 30);
        assert_eq!(config.executor.max_backoff_secs, 600);
        assert_eq!(config.publisher.retry_cap, 5);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
executor:
  max-retries: 5
  poll-interval-secs: 10
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.executor.max_retries, 5);
        assert_eq!(config.executor.poll_interval_secs, 10);
        // Defaults for everything unspecified.
        assert_eq!(config.executor.heartbeat_interval_secs, 60);
        assert_eq!(config.llm.timeout_secs, 120);
    }

    #[test]
    #[serial]
    fn test_env_overlay_wins() {
        unsafe {
            std::env::set_var("MAX_RETRIES", "-1");
            std::env::set_var("INITIAL_BACKOFF_SECONDS", "7");
            std::env::set_var("DETACHED_EXECUTOR", "1");
        }

        let mut executor = ExecutorConfig::default();
        executor.apply_env();
        assert_eq!(executor.max_retries, -1);
        assert_eq!(executor.initial_backoff_secs, 7);
        assert!(executor.detached);

        unsafe {
            std::env::remove_var("MAX_RETRIES");
            std::env::remove_var("INITIAL_BACKOFF_SECONDS");
            std::env::remove_var("DETACHED_EXECUTOR");
        }
    }

    #[test]
    #[serial]
    fn test_env_overlay_ignores_garbage() {
        unsafe {
            std::env::set_var("MAX_CONSECUTIVE_ERRORS", "lots");
        }
        let mut executor = ExecutorConfig::default();
        executor.apply_env();
        assert_eq!(executor.max_consecutive_errors, 10);
        unsafe {
            std::env::remove_var("MAX_CONSECUTIVE_ERRORS");
        }
    }

    #[test]
    fn test_store_path_under_data_dir() {
        let mut config = Config::default();
        config.paths.data_dir = PathBuf::from("/var/lib/conductor");
        assert_eq!(config.store_path(), PathBuf::from("/var/lib/conductor/conductor.db"));
    }
}
