use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use strata_core::error::{Result, StrataError};
use strata_core::time::encode_ts;
use strata_core::traits::RunRecorder;
use strata_core::types::{RunId, RunMetrics, RunStatus};

/// Persists one row per loader invocation: start/end, status, metrics.
pub struct SqliteRunRecorder {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunRecorder {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        let recorder = Self { conn };
        recorder.init()?;
        Ok(recorder)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS pipeline_runs (
                    run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    pipeline_name TEXT NOT NULL,
                    start_time TEXT NOT NULL,
                    end_time TEXT,
                    status TEXT NOT NULL DEFAULT 'running',
                    metrics TEXT,

                    CONSTRAINT pipeline_runs_status_check CHECK (status IN (
                        'running', 'completed', 'completed_with_errors',
                        'failed', 'cancelled'
                    ))
                );

                CREATE INDEX IF NOT EXISTS idx_pipeline_runs_name
                    ON pipeline_runs(pipeline_name);
                CREATE INDEX IF NOT EXISTS idx_pipeline_runs_status
                    ON pipeline_runs(status);",
            )
            .map_err(|e| StrataError::RunMetadata(e.to_string()))?;
        Ok(())
    }

    /// Status and metrics of a recorded run, for tests and operator
    /// queries.
    pub fn get_run(&self, run_id: RunId) -> Result<Option<(RunStatus, Option<RunMetrics>)>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                "SELECT status, metrics FROM pipeline_runs WHERE run_id = ?1",
                [run_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StrataError::RunMetadata(other.to_string())),
            })?;

        match raw {
            None => Ok(None),
            Some((status, metrics)) => {
                let status = RunStatus::parse(&status)?;
                let metrics = metrics
                    .map(|m| {
                        serde_json::from_str(&m)
                            .map_err(|e| StrataError::RunMetadata(e.to_string()))
                    })
                    .transpose()?;
                Ok(Some((status, metrics)))
            }
        }
    }
}

impl RunRecorder for SqliteRunRecorder {
    fn start_run(&self, pipeline: &str) -> Result<RunId> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO pipeline_runs (pipeline_name, start_time, status)
             VALUES (?1, ?2, 'running')",
            params![pipeline, encode_ts(Utc::now())],
        )
        .map_err(|e| StrataError::RunMetadata(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, run_id: RunId, status: RunStatus, metrics: &RunMetrics) -> Result<()> {
        let metrics_json = serde_json::to_string(metrics)
            .map_err(|e| StrataError::RunMetadata(e.to_string()))?;

        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE pipeline_runs
                 SET end_time = ?1, status = ?2, metrics = ?3
                 WHERE run_id = ?4",
                params![encode_ts(Utc::now()), status.as_str(), metrics_json, run_id],
            )
            .map_err(|e| StrataError::RunMetadata(e.to_string()))?;

        if changed == 0 {
            return Err(StrataError::RunMetadata(format!(
                "unknown run_id {}",
                run_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SqliteRunRecorder {
        let conn = Connection::open_in_memory().unwrap();
        SqliteRunRecorder::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_start_and_finish_run() {
        let recorder = setup();

        let run_id = recorder.start_run("scd2_loader").unwrap();
        let (status, metrics) = recorder.get_run(run_id).unwrap().unwrap();
        assert_eq!(status, RunStatus::Running);
        assert!(metrics.is_none());

        let metrics = RunMetrics {
            batches_processed: 3,
            records_applied: 42,
            ..Default::default()
        };
        recorder
            .finish_run(run_id, RunStatus::Completed, &metrics)
            .unwrap();

        let (status, stored) = recorder.get_run(run_id).unwrap().unwrap();
        assert_eq!(status, RunStatus::Completed);
        assert_eq!(stored.unwrap().records_applied, 42);
    }

    #[test]
    fn test_finish_unknown_run_is_error() {
        let recorder = setup();
        assert!(recorder
            .finish_run(999, RunStatus::Completed, &RunMetrics::default())
            .is_err());
    }
}
