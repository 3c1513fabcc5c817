use crate::error::{Result, StrataError};
use serde::{Deserialize, Serialize};

/// Identifier of one loader invocation in the run metadata store.
pub type RunId = i64;

/// Terminal (and initial) states of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "completed_with_errors" => Ok(RunStatus::CompletedWithErrors),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(StrataError::RunMetadata(format!(
                "unknown run status: {}",
                other
            ))),
        }
    }
}

/// Metrics recorded when a loader run finishes. Persisted as JSON in
/// the run metadata store; the single surface an operator needs to
/// assess pipeline health.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub batches_processed: u64,
    pub batches_failed: u64,
    pub batches_quarantined: u64,
    pub records_applied: u64,
    pub records_skipped_stale: u64,
    pub records_skipped_unchanged: u64,
    pub records_quarantined: u64,
    pub current_rows: u64,
    pub historical_rows: u64,
    pub duration_ms: u64,
}
