//! End-to-end pipeline tests: source mutations in, versioned dimension
//! history out.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, DurationRound, Utc};
use rusqlite::params;
use strata::encode_ts;
use strata::prelude::*;
use tempfile::TempDir;

/// Timestamps round-trip through microsecond-precision text.
fn recent(minutes_ago: i64) -> DateTime<Utc> {
    (Utc::now() - Duration::minutes(minutes_ago))
        .duration_trunc(Duration::microseconds(1))
        .unwrap()
}

fn attrs_json(status: &str) -> String {
    format!(r#"{{"status":"{}","tier":"gold"}}"#, status)
}

fn attrs(status: &str) -> Attributes {
    serde_json::from_str(&attrs_json(status)).unwrap()
}

fn seed(
    source: &SqliteChangeSource,
    key: &str,
    status: &str,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
) {
    let conn = source.conn();
    conn.lock()
        .execute(
            "INSERT INTO source_entities (business_key, attributes, created_at, last_modified, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(business_key) DO UPDATE SET
                 attributes = excluded.attributes,
                 last_modified = excluded.last_modified,
                 deleted_at = excluded.deleted_at",
            params![
                key,
                attrs_json(status),
                encode_ts(created_at),
                encode_ts(last_modified),
                deleted_at.map(encode_ts)
            ],
        )
        .unwrap();
}

fn open_pipeline(
    temp: &TempDir,
    extractor: ExtractorConfig,
    loader: LoaderConfig,
) -> (Pipeline, SqliteChangeSource) {
    let source_path = temp.path().join("source.db");
    let source = SqliteChangeSource::open(&source_path).unwrap();
    source.init_schema().unwrap();

    let pipeline = Pipeline::open(
        PipelineConfig::new(temp.path().join("data"), source_path)
            .with_extractor(extractor)
            .with_loader(loader),
    )
    .unwrap();

    (pipeline, source)
}

fn defaults(temp: &TempDir) -> (Pipeline, SqliteChangeSource) {
    open_pipeline(temp, ExtractorConfig::default(), LoaderConfig::default())
}

#[test]
fn test_insert_then_update_builds_versioned_history() {
    let temp = TempDir::new().unwrap();
    let (pipeline, source) = defaults(&temp);

    let t0 = recent(4);
    seed(&source, "order-1", "pending", t0, t0, None);

    let manifest = pipeline.extract_once().unwrap().unwrap();
    assert_eq!(manifest.change_count, 1);
    assert_eq!(manifest.changes[0].operation, Operation::Insert);

    let report = pipeline.run_loader_once();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.metrics.records_applied, 1);
    assert_eq!(report.metrics.current_rows, 1);

    let t1 = recent(2);
    seed(&source, "order-1", "confirmed", t0, t1, None);

    let manifest = pipeline.extract_once().unwrap().unwrap();
    assert_eq!(manifest.changes[0].operation, Operation::Update);

    let report = pipeline.run_loader_once();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.metrics.records_applied, 1);
    assert_eq!(report.metrics.current_rows, 1);
    assert_eq!(report.metrics.historical_rows, 1);

    let history = pipeline.dimension().history("order-1").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].valid_from, t0);
    assert_eq!(history[0].valid_to, Some(t1));
    assert!(!history[0].is_current);
    assert_eq!(history[1].valid_from, t1);
    assert_eq!(history[1].valid_to, None);
    assert!(history[1].is_current);
    assert_eq!(history[1].attributes, attrs("confirmed"));
}

#[test]
fn test_repeated_loader_passes_are_idempotent() {
    let temp = TempDir::new().unwrap();
    let (pipeline, source) = defaults(&temp);

    seed(&source, "order-1", "pending", recent(4), recent(4), None);
    pipeline.extract_once().unwrap().unwrap();
    pipeline.run_loader_once();

    // Manifests are still on disk; the ledger short-circuits them.
    let report = pipeline.run_loader_once();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.metrics.batches_processed, 0);
    assert_eq!(report.metrics.records_applied, 0);

    assert_eq!(pipeline.dimension().history("order-1").unwrap().len(), 1);
    assert_eq!(pipeline.ledger().len().unwrap(), 1);
}

#[test]
fn test_soft_delete_closes_the_current_row() {
    let temp = TempDir::new().unwrap();
    let (pipeline, source) = defaults(&temp);

    let t0 = recent(4);
    seed(&source, "order-1", "pending", t0, t0, None);
    pipeline.extract_once().unwrap().unwrap();
    pipeline.run_loader_once();

    let t1 = recent(2);
    seed(&source, "order-1", "pending", t0, t1, Some(t1));

    let manifest = pipeline.extract_once().unwrap().unwrap();
    assert_eq!(manifest.changes[0].operation, Operation::Delete);
    pipeline.run_loader_once();

    assert!(pipeline.dimension().current_row("order-1").unwrap().is_none());
    let history = pipeline.dimension().history("order-1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].valid_to, Some(t1));
}

#[test]
fn test_malformed_manifest_is_quarantined_not_fatal() {
    let temp = TempDir::new().unwrap();
    let (pipeline, source) = defaults(&temp);

    let t0 = recent(4);
    seed(&source, "order-1", "pending", t0, t0, None);
    pipeline.extract_once().unwrap().unwrap();

    std::fs::write(
        temp.path().join("data/manifests/batch-corrupt.json"),
        b"{ not a manifest",
    )
    .unwrap();

    let report = pipeline.run_loader_once();
    assert_eq!(report.status, RunStatus::CompletedWithErrors);
    assert_eq!(report.metrics.batches_quarantined, 1);
    // The healthy manifest still applied.
    assert_eq!(report.metrics.records_applied, 1);
    assert_eq!(pipeline.manifests().quarantined_count().unwrap(), 1);

    // The quarantined file is out of the scan path for good.
    let report = pipeline.run_loader_once();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.metrics.batches_quarantined, 0);
}

#[test]
fn test_every_loader_pass_is_recorded() {
    let temp = TempDir::new().unwrap();
    let (pipeline, source) = defaults(&temp);

    seed(&source, "order-1", "pending", recent(4), recent(4), None);
    pipeline.extract_once().unwrap().unwrap();

    let report = pipeline.run_loader_once();
    let run_id = report.run_id.unwrap();

    let (status, metrics) = pipeline.recorder().get_run(run_id).unwrap().unwrap();
    assert_eq!(status, RunStatus::Completed);
    let metrics = metrics.unwrap();
    assert_eq!(metrics.records_applied, 1);
    assert_eq!(metrics.current_rows, 1);
}

#[test]
fn test_stale_manifest_after_later_state_is_skipped() {
    let temp = TempDir::new().unwrap();
    let (pipeline, source) = defaults(&temp);

    let t0 = recent(4);
    let t1 = recent(2);
    seed(&source, "order-1", "confirmed", t0, t1, None);
    pipeline.extract_once().unwrap().unwrap();
    pipeline.run_loader_once();

    // A manifest holding the key's earlier state, delivered late.
    let stale = BatchManifest::new(
        "batch-00000000000000000-late".to_string(),
        Utc::now(),
        t0 - Duration::minutes(1),
        vec![ChangeRecord {
            business_key: "order-1".to_string(),
            attributes: attrs("pending"),
            operation: Operation::Insert,
            change_effective_time: t0,
            captured_at: t0,
        }],
    );
    pipeline.manifests().publish(&stale).unwrap();

    let report = pipeline.run_loader_once();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.metrics.records_skipped_stale, 1);

    // Dimension retains the later state, in a single row.
    let history = pipeline.dimension().history("order-1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].attributes, attrs("confirmed"));
    assert!(history[0].is_current);
}

#[test]
fn test_sweep_never_deletes_unapplied_manifests() {
    let temp = TempDir::new().unwrap();
    let source_path = temp.path().join("source.db");
    let source = SqliteChangeSource::open(&source_path).unwrap();
    source.init_schema().unwrap();

    let pipeline = Pipeline::open(
        PipelineConfig::new(temp.path().join("data"), source_path)
            .with_manifest_retention(StdDuration::from_secs(0)),
    )
    .unwrap();

    seed(&source, "order-1", "pending", recent(4), recent(4), None);
    pipeline.extract_once().unwrap().unwrap();

    // Past retention but not yet in the ledger: the sweep must leave
    // it alone.
    assert_eq!(pipeline.sweep_expired_manifests().unwrap(), 0);
    assert_eq!(pipeline.manifests().pending().unwrap().len(), 1);

    pipeline.run_loader_once();
    assert_eq!(pipeline.sweep_expired_manifests().unwrap(), 1);
    assert!(pipeline.manifests().pending().unwrap().is_empty());
}

#[test]
fn test_transient_store_failure_fails_run_without_losing_work() {
    let temp = TempDir::new().unwrap();
    let source_path = temp.path().join("source.db");
    let source = SqliteChangeSource::open(&source_path).unwrap();
    source.init_schema().unwrap();

    let pipeline = Pipeline::open(
        PipelineConfig::new(temp.path().join("data"), source_path)
            .with_dimension(
                DimensionConfig::new(temp.path().join("data/dimension.db"))
                    .with_busy_timeout_ms(50),
            )
            .with_loader(
                LoaderConfig::new()
                    .with_max_retries(2)
                    .with_retry_backoff_ms(10),
            ),
    )
    .unwrap();

    seed(&source, "order-1", "pending", recent(4), recent(4), None);
    pipeline.extract_once().unwrap().unwrap();

    // A competing writer holds the dimension database, so every apply
    // attempt times out.
    let blocker = rusqlite::Connection::open(temp.path().join("data/dimension.db")).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let report = pipeline.run_loader_once();
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.metrics.batches_failed, 1);
    assert_eq!(report.metrics.records_applied, 0);

    // Retries were bounded, nothing was ledgered; once the writer
    // releases, the same manifest applies untouched.
    blocker.execute_batch("ROLLBACK").unwrap();
    assert_eq!(pipeline.ledger().len().unwrap(), 0);

    let report = pipeline.run_loader_once();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.metrics.records_applied, 1);
    assert_eq!(pipeline.ledger().len().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_loops_process_changes_and_stop_on_shutdown() {
    let temp = TempDir::new().unwrap();
    let (pipeline, source) = open_pipeline(
        &temp,
        ExtractorConfig::new()
            .with_safety_margin_ms(0)
            .with_poll_interval_ms(20),
        LoaderConfig::new().with_poll_interval_ms(20),
    );

    seed(&source, "order-1", "pending", recent(1), recent(1), None);

    let pipeline = Arc::new(pipeline);
    let flag = pipeline.shutdown_flag();

    let extractor_loop = ExtractorLoop::new(pipeline.clone());
    let loader_loop = LoaderLoop::new(pipeline.clone());
    let extractor_task = tokio::spawn(async move { extractor_loop.run().await });
    let loader_task = tokio::spawn(async move { loader_loop.run().await });

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    flag.request();

    tokio::time::timeout(StdDuration::from_secs(5), async {
        extractor_task.await.unwrap();
        loader_task.await.unwrap();
    })
    .await
    .unwrap();

    let current = pipeline.dimension().current_row("order-1").unwrap().unwrap();
    assert_eq!(current.attributes, attrs("pending"));
    assert_eq!(pipeline.ledger().len().unwrap(), 1);
}
