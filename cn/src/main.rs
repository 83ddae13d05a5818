//! cn - orchestrator CLI entry point

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};

use conductor::cli::{Cli, Command};
use conductor::config::Config;
use conductor::llm::{HttpLlmClient, LlmClient, LlmError};
use conductor::orchestrator::{InsightsExtractor, Orchestrator, WaitMode};
use conductor::publisher::{PublishError, Publisher, RestRemote, retry};
use conductor::{logging, publisher};
use queuestore::Datastore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let _log_guard = logging::init(Some(&config.paths.log_dir), "conductor.log", cli.verbose)?;

    match cli.command {
        Command::Run {
            force_inline,
            wait,
            wait_forever,
        } => {
            let wait_mode = if wait_forever {
                WaitMode::Forever
            } else {
                match wait {
                    Some(secs) => WaitMode::Bounded(Duration::from_secs(secs)),
                    None => WaitMode::None,
                }
            };

            let mut orchestrator = Orchestrator::new(config)?;
            let report = orchestrator.run_cycle(force_inline, wait_mode).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Status => {
            let store = Datastore::open(config.store_path()).context("Failed to open store")?;
            let health = store.system_health()?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }

        Command::Publish => {
            let mut store = Datastore::open(config.store_path()).context("Failed to open store")?;
            match RestRemote::from_env(&config.publisher) {
                Ok(remote) => {
                    let remote: Arc<dyn publisher::RemoteTarget> = Arc::new(remote);
                    let report = Publisher::new(remote).run_pass(&mut store, &config.paths.output_dir).await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Err(PublishError::NotConfigured(msg)) => {
                    println!("Remote target not configured: {msg}");
                }
                Err(e) => return Err(e).context("Remote target setup failed"),
            }
        }

        Command::RetryPublishes => {
            let mut store = Datastore::open(config.store_path()).context("Failed to open store")?;
            match RestRemote::from_env(&config.publisher) {
                Ok(remote) => {
                    let remote: Arc<dyn publisher::RemoteTarget> = Arc::new(remote);
                    let publisher = Publisher::new(remote);
                    let report = retry::run_retry_pass(&mut store, &publisher, config.publisher.retry_cap).await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Err(PublishError::NotConfigured(msg)) => {
                    println!("Remote target not configured: {msg}");
                }
                Err(e) => return Err(e).context("Remote target setup failed"),
            }
        }

        Command::Insights { ignore_schedule } => {
            let store = Datastore::open(config.store_path()).context("Failed to open store")?;
            let llm: Option<Arc<dyn LlmClient>> = match HttpLlmClient::from_config(&config.llm) {
                Ok(client) => Some(Arc::new(client)),
                Err(LlmError::NotConfigured(_)) => None,
                Err(e) => return Err(e).context("LLM setup failed"),
            };
            let extractor = InsightsExtractor::new(llm, Duration::from_secs(config.executor.llm_timeout_secs));
            let created = extractor
                .run(&store, &config.paths.output_dir, ignore_schedule)
                .await?;
            println!("Created {created} tasks");
        }
    }

    Ok(())
}
