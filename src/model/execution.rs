//! Execution logs: one append-only record per orchestrator run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::work::{FailureStage, WorkId};
use crate::error::Error;

/// Progress report emitted at the start of each pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub step: u32,
    pub total: u32,
    pub message: String,
}

/// One timestamped line in an execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub at: DateTime<Utc>,
    pub step: u32,
    pub total: u32,
    pub message: String,
}

impl From<Progress> for ExecutionEntry {
    fn from(p: Progress) -> Self {
        Self {
            at: Utc::now(),
            step: p.step,
            total: p.total,
            message: p.message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != ExecutionStatus::Running
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(ExecutionStatus::Running),
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            other => Err(Error::Other(format!("unknown execution status: {other}"))),
        }
    }
}

/// A single orchestrator run as seen by operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub work_item_id: WorkId,
    pub status: ExecutionStatus,
    pub entries: Vec<ExecutionEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub content_id: Option<Uuid>,
    pub published_url: Option<String>,
    pub error: Option<String>,
    pub failed_stage: Option<FailureStage>,
}

/// Terminal fields written once when a run ends.
#[derive(Debug, Clone)]
pub struct ExecutionFinish {
    pub status: ExecutionStatus,
    pub duration_ms: u64,
    pub content_id: Option<Uuid>,
    pub published_url: Option<String>,
    pub error: Option<String>,
    pub failed_stage: Option<FailureStage>,
}
