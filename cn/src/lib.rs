//! Conductor - autonomous analysis-cycle orchestrator
//!
//! Conductor drives periodic analysis cycles: external generators write
//! report documents, insights extraction turns reports into queued tasks,
//! a standalone executor daemon drains the queue under claim/retry
//! discipline, and a type-aware publisher pushes finished documents to a
//! remote target with fingerprint dedup. All shared state lives in the
//! [`queuestore`] SQLite file; processes coordinate through it alone.
//!
//! # Modules
//!
//! - [`config`] - configuration file + environment overlay
//! - [`logging`] - console and rolling-file log setup
//! - [`frontmatter`] - document header parsing and generation
//! - [`fingerprint`] - content fingerprints for publish dedup
//! - [`llm`] - LLM provider trait and HTTP client
//! - [`handlers`] - action-type handler registry
//! - [`executor`] - the executor daemon
//! - [`publisher`] - cadence-gated remote publishing
//! - [`orchestrator`] - the cycle driver
//! - [`cli`] - orchestrator command-line interface

pub mod cli;
pub mod config;
pub mod executor;
pub mod fingerprint;
pub mod frontmatter;
pub mod handlers;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod publisher;

// Re-export commonly used types
pub use config::{Config, ExecutorConfig, LlmConfig, PathsConfig, PublisherConfig};
pub use executor::{ExecutorDaemon, ExecutorStats, HealthSnapshot};
pub use frontmatter::{Frontmatter, is_ready_for_sync};
pub use handlers::{HandlerError, HandlerOutcome, HandlerRegistry, TaskHandler};
pub use llm::{Completion, LlmClient, LlmError};
pub use orchestrator::{CycleReport, Orchestrator, WaitMode};
pub use publisher::{PublishReport, Publisher, RemoteTarget, SyncOutcome};
