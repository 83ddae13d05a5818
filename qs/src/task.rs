//! Task record and its enums
//!
//! A task is one executable work item derived from a report (or enqueued
//! externally), identified by a unique `action_id` and moved through the
//! queue state machine by the executor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Priority level for queue ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Stable on-disk representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Task queue status
///
/// Legal transitions: pending -> in_progress (claim), in_progress ->
/// pending (release), in_progress -> completed / failed / skipped.
/// `flagged` is an operator hold set outside the executor path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Flagged,
    Skipped,
}

impl TaskStatus {
    /// Stable on-disk representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Flagged => "flagged",
            Self::Skipped => "skipped",
        }
    }

    /// Terminal statuses are never overwritten by an enqueue upsert.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "flagged" => Ok(Self::Flagged),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// Kind of work a task represents, steering handler selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Research,
    Monitoring,
    DataFetch,
    Calculation,
    CodeExploration,
    Insights,
    Generate,
    /// Unrecognized tag, preserved verbatim. Resolves to the
    /// permanent-failure branch at execution time.
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Research => "research",
            Self::Monitoring => "monitoring",
            Self::DataFetch => "data_fetch",
            Self::Calculation => "calculation",
            Self::CodeExploration => "code_exploration",
            Self::Insights => "insights",
            Self::Generate => "generate",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ActionType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "research" => Self::Research,
            "monitoring" => Self::Monitoring,
            "data_fetch" => Self::DataFetch,
            "calculation" => Self::Calculation,
            "code_exploration" => Self::CodeExploration,
            "insights" => Self::Insights,
            "generate" => Self::Generate,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ActionType> for String {
    fn from(t: ActionType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured task metadata persisted as a JSON string
///
/// Known fields are typed; anything else round-trips through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_reason: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TaskMetadata {
    /// Parse a stored metadata blob, tolerating absent or malformed input.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Self::default(),
            Some(s) if s.trim().is_empty() => Self::default(),
            Some(s) => serde_json::from_str(s).unwrap_or_else(|e| {
                warn!(error = %e, "Unparseable task metadata, treating as empty");
                Self::default()
            }),
        }
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A persisted task row
///
/// Timestamps are canonical store timestamp strings (see [`crate::now_ts`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub action_id: String,
    pub action_type: ActionType,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub source_report: Option<String>,
    pub source_context: Option<String>,
    pub deadline: Option<String>,
    pub scheduled_for: Option<String>,
    pub result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub metadata: TaskMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!("NORMAL".parse::<Priority>().unwrap(), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::Flagged.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "in_progress", "completed", "failed", "flagged", "skipped"] {
            let status: TaskStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
    }

    #[test]
    fn test_action_type_preserves_unknown() {
        let t = ActionType::from("telemetry_rollup");
        assert_eq!(t, ActionType::Other("telemetry_rollup".to_string()));
        assert_eq!(t.as_str(), "telemetry_rollup");
    }

    #[test]
    fn test_action_type_serde_as_string() {
        let json = serde_json::to_string(&ActionType::DataFetch).unwrap();
        assert_eq!(json, "\"data_fetch\"");
        let back: ActionType = serde_json::from_str("\"research\"").unwrap();
        assert_eq!(back, ActionType::Research);
    }

    #[test]
    fn test_metadata_parse_tolerates_garbage() {
        assert_eq!(TaskMetadata::parse(None), TaskMetadata::default());
        assert_eq!(TaskMetadata::parse(Some("")), TaskMetadata::default());
        assert_eq!(TaskMetadata::parse(Some("not json")), TaskMetadata::default());
    }

    #[test]
    fn test_metadata_round_trip_with_extras() {
        let mut meta = TaskMetadata {
            claimed_by: Some("executor-host-42".to_string()),
            ..Default::default()
        };
        meta.extra
            .insert("origin".to_string(), serde_json::json!("insights"));

        let json = meta.to_json();
        let back = TaskMetadata::parse(Some(&json));
        assert_eq!(back.claimed_by.as_deref(), Some("executor-host-42"));
        assert_eq!(back.extra.get("origin"), Some(&serde_json::json!("insights")));
    }
}
