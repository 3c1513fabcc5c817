use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use strata_core::config::{DeletePolicy, LoaderConfig};
use strata_core::error::{Result, StrataError};
use strata_core::lock_manager::LockManager;
use strata_core::traits::{DimensionStore, DimensionTxn, IdempotencyLedger};
use strata_core::types::{BatchManifest, ChangeRecord, NewDimensionRow, Operation, RunMetrics};

/// Per-record classification counters for one manifest application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Batch id was already in the ledger; nothing was touched.
    pub already_applied: bool,
    /// Records that produced a new dimension version.
    pub applied: u64,
    /// Records at or behind the current version's `valid_from`.
    pub skipped_stale: u64,
    /// Records whose attribute snapshot matched the current version.
    pub skipped_unchanged: u64,
    /// Records that hit a consistency fault and were skipped.
    pub quarantined: u64,
}

impl ApplyOutcome {
    pub fn merge_into(&self, metrics: &mut RunMetrics) {
        metrics.records_applied += self.applied;
        metrics.records_skipped_stale += self.skipped_stale;
        metrics.records_skipped_unchanged += self.skipped_unchanged;
        metrics.records_quarantined += self.quarantined;
    }
}

enum RecordOutcome {
    Applied,
    SkippedStale,
    SkippedUnchanged,
}

/// Applies batch manifests to the historical dimension.
///
/// Each logical change runs inside one transaction under a key-scoped
/// lock; a crash between records leaves the batch out of the ledger,
/// and the retry re-classifies already-applied records as stale skips.
pub struct Scd2Loader<D: DimensionStore, L: IdempotencyLedger> {
    dimension: Arc<D>,
    ledger: Arc<L>,
    locks: Arc<LockManager>,
    config: LoaderConfig,
}

impl<D: DimensionStore, L: IdempotencyLedger> Scd2Loader<D, L> {
    pub fn new(dimension: Arc<D>, ledger: Arc<L>, config: LoaderConfig) -> Self {
        let locks = Arc::new(LockManager::new(
            config.lock_stripes,
            Duration::from_millis(config.lock_timeout_ms),
        ));
        Self {
            dimension,
            ledger,
            locks,
            config,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn dimension(&self) -> &Arc<D> {
        &self.dimension
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Apply one manifest in its stored order.
    ///
    /// Consistency faults skip the record and continue; any other error
    /// aborts the batch before the ledger entry is written, so the
    /// whole manifest is retried later.
    pub fn apply_manifest(&self, manifest: &BatchManifest) -> Result<ApplyOutcome> {
        if self.ledger.contains(&manifest.batch_id)? {
            tracing::debug!("Batch {} already applied, skipping", manifest.batch_id);
            return Ok(ApplyOutcome {
                already_applied: true,
                ..ApplyOutcome::default()
            });
        }

        let mut outcome = ApplyOutcome::default();
        for record in &manifest.changes {
            match self.apply_record(&manifest.batch_id, record) {
                Ok(RecordOutcome::Applied) => outcome.applied += 1,
                Ok(RecordOutcome::SkippedStale) => outcome.skipped_stale += 1,
                Ok(RecordOutcome::SkippedUnchanged) => outcome.skipped_unchanged += 1,
                Err(StrataError::Consistency(msg)) => {
                    tracing::error!(
                        "Consistency fault on key {} in batch {}: {}",
                        record.business_key,
                        manifest.batch_id,
                        msg
                    );
                    outcome.quarantined += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.ledger.append(&manifest.batch_id, Utc::now())?;

        tracing::info!(
            "Applied batch {}: {} applied, {} stale, {} unchanged, {} quarantined",
            manifest.batch_id,
            outcome.applied,
            outcome.skipped_stale,
            outcome.skipped_unchanged,
            outcome.quarantined
        );

        Ok(outcome)
    }

    fn apply_record(&self, batch_id: &str, record: &ChangeRecord) -> Result<RecordOutcome> {
        let _guard = self.locks.lock(&record.business_key)?;

        let mut txn = self.dimension.begin()?;
        let current = txn.current_row(&record.business_key)?;

        let outcome = match current {
            None => {
                if record.operation == Operation::Delete {
                    // Nothing to close; a retry of an already-closed
                    // delete lands here too.
                    tracing::debug!(
                        "DELETE for key {} with no current row, skipping",
                        record.business_key
                    );
                    RecordOutcome::SkippedStale
                } else {
                    txn.insert_version(&NewDimensionRow {
                        business_key: record.business_key.clone(),
                        attributes: record.attributes.clone(),
                        valid_from: record.change_effective_time,
                        source_operation: record.operation,
                        source_batch_id: batch_id.to_string(),
                    })?;
                    txn.commit()?;
                    return Ok(RecordOutcome::Applied);
                }
            }
            Some(row) if record.change_effective_time <= row.valid_from => {
                tracing::debug!(
                    "Stale change for key {} ({} <= {}), skipping",
                    record.business_key,
                    record.change_effective_time,
                    row.valid_from
                );
                RecordOutcome::SkippedStale
            }
            Some(row) => match record.operation {
                Operation::Delete => {
                    txn.expire_current(&record.business_key, record.change_effective_time)?;
                    if self.config.delete_policy == DeletePolicy::Tombstone {
                        txn.insert_version(&NewDimensionRow {
                            business_key: record.business_key.clone(),
                            attributes: row.attributes,
                            valid_from: record.change_effective_time,
                            source_operation: Operation::Delete,
                            source_batch_id: batch_id.to_string(),
                        })?;
                    }
                    txn.commit()?;
                    return Ok(RecordOutcome::Applied);
                }
                _ if row.attributes == record.attributes => {
                    tracing::debug!(
                        "Unchanged snapshot for key {}, skipping",
                        record.business_key
                    );
                    RecordOutcome::SkippedUnchanged
                }
                _ => {
                    txn.expire_current(&record.business_key, record.change_effective_time)?;
                    txn.insert_version(&NewDimensionRow {
                        business_key: record.business_key.clone(),
                        attributes: record.attributes.clone(),
                        valid_from: record.change_effective_time,
                        source_operation: record.operation,
                        source_batch_id: batch_id.to_string(),
                    })?;
                    txn.commit()?;
                    return Ok(RecordOutcome::Applied);
                }
            },
        };

        // Skip branches mutate nothing.
        txn.rollback();
        Ok(outcome)
    }
}
