use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use strata_core::config::ExtractorConfig;
use strata_core::error::{Result, StrataError};
use strata_core::traits::{ChangeSource, PageCursor};
use strata_core::types::{BatchManifest, ChangeRecord};
use strata_manifest::{ManifestStore, WatermarkStore};

/// Polls the change source above the watermark and publishes ordered,
/// durable batch manifests.
///
/// The watermark advances only after a manifest is durably published,
/// so a failed poll is simply retried over the same window on the next
/// cycle; deduplication happens downstream.
pub struct Extractor<C: ChangeSource> {
    source: Arc<C>,
    manifests: Arc<ManifestStore>,
    watermark: Arc<WatermarkStore>,
    config: ExtractorConfig,
    seq: AtomicU64,
}

impl<C: ChangeSource> Extractor<C> {
    pub fn new(
        source: Arc<C>,
        manifests: Arc<ManifestStore>,
        watermark: Arc<WatermarkStore>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            source,
            manifests,
            watermark,
            config,
            seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Run one extraction cycle.
    ///
    /// Returns the published manifest, or `None` when the window held
    /// no changes — an empty poll is cheap and side-effect-free.
    pub fn extract_once(&self) -> Result<Option<BatchManifest>> {
        let now = Utc::now();
        let upper_bound = now - Duration::milliseconds(self.config.safety_margin_ms as i64);

        let watermark = match self.watermark.load()? {
            Some(wm) => wm,
            None => {
                let lookback = now - Duration::milliseconds(self.config.initial_lookback_ms as i64);
                tracing::info!("No watermark found, starting from {}", lookback);
                lookback
            }
        };

        if upper_bound <= watermark {
            return Ok(None);
        }

        let changes = self.fetch_window(watermark, upper_bound, now)?;
        if changes.is_empty() {
            tracing::debug!("No changes since {}", watermark);
            return Ok(None);
        }

        let batch_id = self.next_batch_id(now);
        let manifest = BatchManifest::new(batch_id, now, watermark, changes);

        self.manifests.publish(&manifest)?;

        // Durable publish succeeded; only now may the cursor move.
        let new_watermark = manifest
            .max_change_effective_time()
            .ok_or_else(|| StrataError::InvalidState("published an empty manifest".into()))?;
        self.watermark.save(new_watermark)?;

        tracing::info!(
            "Extracted batch {} ({} changes), watermark {} -> {}",
            manifest.batch_id,
            manifest.change_count,
            watermark,
            new_watermark
        );

        Ok(Some(manifest))
    }

    /// Page through the window `(watermark, upper_bound]` in
    /// `(change_effective_time, business_key)` order.
    fn fetch_window(
        &self,
        watermark: DateTime<Utc>,
        upper_bound: DateTime<Utc>,
        captured_at: DateTime<Utc>,
    ) -> Result<Vec<ChangeRecord>> {
        let mut changes = Vec::new();
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = self.source.fetch_page(
                watermark,
                upper_bound,
                cursor.as_ref(),
                self.config.page_size,
            )?;

            let full_page = page.len() == self.config.page_size;
            if let Some(last) = page.last() {
                cursor = Some(PageCursor::from_change(last));
            }

            for change in page {
                changes.push(ChangeRecord {
                    business_key: change.business_key,
                    attributes: change.attributes,
                    operation: change.operation,
                    change_effective_time: change.changed_at,
                    captured_at,
                });
            }

            if !full_page {
                break;
            }
        }

        Ok(changes)
    }

    fn next_batch_id(&self, extracted_at: DateTime<Utc>) -> String {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        format!(
            "batch-{}-{:04}",
            extracted_at.format("%Y%m%d%H%M%S%3f"),
            seq
        )
    }
}
