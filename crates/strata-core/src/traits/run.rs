use crate::error::Result;
use crate::types::{RunId, RunMetrics, RunStatus};

/// Records start/end/status/metrics per loader invocation.
///
/// Not part of the correctness core: callers log recorder failures and
/// never roll them back into loader transactions.
pub trait RunRecorder {
    fn start_run(&self, pipeline: &str) -> Result<RunId>;

    fn finish_run(&self, run_id: RunId, status: RunStatus, metrics: &RunMetrics) -> Result<()>;
}
