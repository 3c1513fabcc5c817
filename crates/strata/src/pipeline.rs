//! Wired-together pipeline: bundled stores, the extractor and loader,
//! and the long-running poll loops.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_core::config::{DimensionConfig, ExtractorConfig, LoaderConfig};
use strata_core::error::{Result, StrataError};
use strata_core::traits::{DimensionStore, IdempotencyLedger, RunRecorder};
use strata_core::types::{BatchManifest, RunId, RunMetrics, RunStatus};
use strata_extractor::Extractor;
use strata_loader::{ApplyOutcome, Scd2Loader};
use strata_manifest::{ManifestStore, ManifestStoreConfig, WatermarkStore};
use strata_sqlite::{SqliteChangeSource, SqliteDimensionStore, SqliteLedger, SqliteRunRecorder};

use crate::shutdown::ShutdownFlag;

const LOADER_RUN_NAME: &str = "scd2_loader";

/// Configuration for a bundled pipeline rooted at one directory.
///
/// Layout under `base_dir`:
/// - `manifests/` - published batch manifests, watermark file, and the
///   `manifests/quarantine/` subdirectory
/// - `dimension.db` - historical dimension, idempotency ledger, and
///   run metadata
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    /// Operational SQLite database holding `source_entities`.
    pub source_path: PathBuf,
    pub extractor: ExtractorConfig,
    pub loader: LoaderConfig,
    /// Overrides the dimension database settings; the default lives at
    /// `base_dir/dimension.db`.
    pub dimension: Option<DimensionConfig>,
    /// When set, applied manifests older than this are deleted after
    /// each completed loader pass. Unapplied and quarantined manifests
    /// are kept.
    pub manifest_retention: Option<Duration>,
}

impl PipelineConfig {
    pub fn new(base_dir: impl Into<PathBuf>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            source_path: source_path.into(),
            extractor: ExtractorConfig::default(),
            loader: LoaderConfig::default(),
            dimension: None,
            manifest_retention: None,
        }
    }

    pub fn with_extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_dimension(mut self, dimension: DimensionConfig) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_manifest_retention(mut self, retention: Duration) -> Self {
        self.manifest_retention = Some(retention);
        self
    }
}

/// Result of one loader pass over the pending manifests.
#[derive(Debug, Clone)]
pub struct LoaderRunReport {
    /// None when run metadata could not be recorded.
    pub run_id: Option<RunId>,
    pub status: RunStatus,
    pub metrics: RunMetrics,
}

/// One extractor plus one loader sharing a manifest directory, with
/// ledger and run metadata co-located in the dimension database.
pub struct Pipeline {
    extractor: Extractor<SqliteChangeSource>,
    loader: Scd2Loader<SqliteDimensionStore, SqliteLedger>,
    manifests: Arc<ManifestStore>,
    dimension: Arc<SqliteDimensionStore>,
    recorder: Arc<SqliteRunRecorder>,
    shutdown: ShutdownFlag,
    manifest_retention: Option<Duration>,
}

impl Pipeline {
    pub fn open(config: PipelineConfig) -> Result<Self> {
        let source = Arc::new(SqliteChangeSource::open(&config.source_path)?);

        let manifest_dir = config.base_dir.join("manifests");
        let manifests = Arc::new(ManifestStore::open(ManifestStoreConfig::new(
            manifest_dir.clone(),
        ))?);
        let watermark = Arc::new(WatermarkStore::open(manifest_dir)?);

        let dimension_config = config
            .dimension
            .unwrap_or_else(|| DimensionConfig::new(config.base_dir.join("dimension.db")));
        let dimension = Arc::new(SqliteDimensionStore::open(dimension_config)?);
        let ledger = Arc::new(SqliteLedger::new(dimension.conn())?);
        let recorder = Arc::new(SqliteRunRecorder::new(dimension.conn())?);

        let extractor = Extractor::new(source, manifests.clone(), watermark, config.extractor);
        let loader = Scd2Loader::new(dimension.clone(), ledger, config.loader);

        Ok(Self {
            extractor,
            loader,
            manifests,
            dimension,
            recorder,
            shutdown: ShutdownFlag::new(),
            manifest_retention: config.manifest_retention,
        })
    }

    pub fn manifests(&self) -> &Arc<ManifestStore> {
        &self.manifests
    }

    pub fn dimension(&self) -> &Arc<SqliteDimensionStore> {
        &self.dimension
    }

    pub fn ledger(&self) -> &Arc<SqliteLedger> {
        self.loader.ledger()
    }

    pub fn recorder(&self) -> &Arc<SqliteRunRecorder> {
        &self.recorder
    }

    /// A handle that stops both loops at their next boundary.
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request();
    }

    /// One extraction cycle. See [`Extractor::extract_once`].
    pub fn extract_once(&self) -> Result<Option<BatchManifest>> {
        self.extractor.extract_once()
    }

    /// One loader pass: scan pending manifests in arrival order, apply
    /// each with bounded retries, quarantine the malformed ones, and
    /// record the run.
    ///
    /// A transient failure that exhausts its retries marks the run
    /// failed and leaves the remaining manifests for the next pass;
    /// watermark and ledger state are never advanced past the failure.
    pub fn run_loader_once(&self) -> LoaderRunReport {
        let started = Instant::now();

        let run_id = match self.recorder.start_run(LOADER_RUN_NAME) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Run metadata unavailable: {}", e);
                None
            }
        };

        let mut metrics = RunMetrics::default();
        let mut failed = false;
        let mut cancelled = false;

        match self.manifests.pending() {
            Err(e) => {
                tracing::error!("Manifest scan failed: {}", e);
                failed = true;
            }
            Ok(paths) => {
                for path in paths {
                    if self.shutdown.is_requested() {
                        cancelled = true;
                        break;
                    }

                    let manifest = match self.manifests.load(&path) {
                        Ok(m) => m,
                        Err(e @ (StrataError::Manifest(_) | StrataError::Serialization(_))) => {
                            tracing::warn!("Malformed manifest {}: {}", path.display(), e);
                            match self.manifests.quarantine(&path) {
                                Ok(_) => metrics.batches_quarantined += 1,
                                Err(e) => {
                                    tracing::error!(
                                        "Failed to quarantine {}: {}",
                                        path.display(),
                                        e
                                    );
                                    failed = true;
                                    break;
                                }
                            }
                            continue;
                        }
                        Err(e) => {
                            tracing::error!("Failed to read {}: {}", path.display(), e);
                            metrics.batches_failed += 1;
                            failed = true;
                            break;
                        }
                    };

                    match self.apply_with_retry(&manifest) {
                        Ok(outcome) => {
                            if !outcome.already_applied {
                                metrics.batches_processed += 1;
                                outcome.merge_into(&mut metrics);
                            }
                        }
                        Err(e) => {
                            tracing::error!("Batch {} failed: {}", manifest.batch_id, e);
                            metrics.batches_failed += 1;
                            failed = true;
                            break;
                        }
                    }
                }
            }
        }

        match self.dimension.stats() {
            Ok(stats) => {
                metrics.current_rows = stats.current_rows;
                metrics.historical_rows = stats.historical_rows;
            }
            Err(e) => tracing::warn!("Dimension stats unavailable: {}", e),
        }
        metrics.duration_ms = started.elapsed().as_millis() as u64;

        let status = if failed {
            RunStatus::Failed
        } else if cancelled {
            RunStatus::Cancelled
        } else if metrics.batches_quarantined > 0 || metrics.records_quarantined > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };

        if let Some(id) = run_id {
            if let Err(e) = self.recorder.finish_run(id, status, &metrics) {
                tracing::warn!("Failed to record run {}: {}", id, e);
            }
        }

        LoaderRunReport {
            run_id,
            status,
            metrics,
        }
    }

    fn apply_with_retry(&self, manifest: &BatchManifest) -> Result<ApplyOutcome> {
        let config = self.loader.config();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.loader.apply_manifest(manifest) {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempt < config.max_retries => {
                    tracing::warn!(
                        "Batch {} attempt {}/{} failed, retrying: {}",
                        manifest.batch_id,
                        attempt,
                        config.max_retries,
                        e
                    );
                    std::thread::sleep(Duration::from_millis(config.retry_backoff_ms));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete applied manifests past the configured retention; a batch
    /// the ledger has not seen is never deleted. No-op when retention
    /// is unset.
    pub fn sweep_expired_manifests(&self) -> Result<usize> {
        match self.manifest_retention {
            Some(retention) => self
                .manifests
                .sweep_older_than(retention, |id| self.loader.ledger().contains(id)),
            None => Ok(0),
        }
    }
}

/// Long-running extraction cycle: poll, publish, sleep.
pub struct ExtractorLoop {
    pipeline: Arc<Pipeline>,
}

impl ExtractorLoop {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Run until shutdown is requested. Errors back off and retry; the
    /// watermark only moves on durable publish, so a failed cycle is
    /// re-covered by the next one.
    pub async fn run(&self) {
        let config = self.pipeline.extractor.config().clone();
        tracing::info!("Extractor loop started");

        while !self.pipeline.shutdown.is_requested() {
            match self.pipeline.extract_once() {
                Ok(Some(manifest)) => {
                    tracing::debug!(
                        "Published batch {} with {} changes",
                        manifest.batch_id,
                        manifest.change_count
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Extraction failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(config.error_backoff_ms)).await;
                    continue;
                }
            }
            tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
        }

        tracing::info!("Extractor loop stopped");
    }
}

/// Long-running apply cycle: one loader pass per interval, manifest
/// sweep after each pass.
pub struct LoaderLoop {
    pipeline: Arc<Pipeline>,
}

impl LoaderLoop {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) {
        let config = self.pipeline.loader.config().clone();
        tracing::info!("Loader loop started");

        while !self.pipeline.shutdown.is_requested() {
            // The pass does blocking store IO and retry sleeps; it
            // runs off the async workers.
            let pipeline = self.pipeline.clone();
            let report =
                match tokio::task::spawn_blocking(move || pipeline.run_loader_once()).await {
                    Ok(report) => report,
                    Err(e) => {
                        tracing::error!("Loader pass aborted: {}", e);
                        break;
                    }
                };

            let backoff_ms = if report.status == RunStatus::Failed {
                config.error_backoff_ms
            } else {
                if let Err(e) = self.pipeline.sweep_expired_manifests() {
                    tracing::warn!("Manifest sweep failed: {}", e);
                }
                config.poll_interval_ms
            };
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }

        tracing::info!("Loader loop stopped");
    }
}
