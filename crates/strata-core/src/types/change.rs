use crate::error::{Result, StrataError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full attribute snapshot of an entity at capture time.
///
/// Opaque to the pipeline; the loader only ever compares snapshots for
/// equality to suppress no-op history rows.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Source mutation kind carried on every change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(StrataError::Serialization(format!(
                "unknown operation: {}",
                other
            ))),
        }
    }
}

/// One captured mutation. Immutable once written into a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Natural identifier of the entity, stable across its history.
    pub business_key: String,

    /// Attribute snapshot at capture time.
    pub attributes: Attributes,

    pub operation: Operation,

    /// Source-side last-modified timestamp.
    pub change_effective_time: DateTime<Utc>,

    /// Extractor wall-clock time at capture.
    pub captured_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Deterministic replay order: `(change_effective_time, business_key)`.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.change_effective_time, self.business_key.as_str())
    }
}

/// A durable, self-describing unit of extracted work.
///
/// Written once by the extractor, never mutated; consumed
/// at-most-effectively-once by the loader via the idempotency ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    /// Globally unique, derived from extraction time plus a sequence.
    pub batch_id: String,

    pub extracted_at: DateTime<Utc>,

    /// Watermark in effect when extraction began.
    pub watermark_before: DateTime<Utc>,

    pub change_count: usize,

    /// Ordered by `(change_effective_time, business_key)` ascending.
    pub changes: Vec<ChangeRecord>,
}

impl BatchManifest {
    /// Assemble a manifest, sorting changes into replay order.
    pub fn new(
        batch_id: String,
        extracted_at: DateTime<Utc>,
        watermark_before: DateTime<Utc>,
        mut changes: Vec<ChangeRecord>,
    ) -> Self {
        changes.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self {
            batch_id,
            extracted_at,
            watermark_before,
            change_count: changes.len(),
            changes,
        }
    }

    /// Maximum `change_effective_time` in the batch, used to advance
    /// the watermark after a durable publish.
    pub fn max_change_effective_time(&self) -> Option<DateTime<Utc>> {
        self.changes.iter().map(|c| c.change_effective_time).max()
    }

    /// Reject manifests whose contents do not match their own header
    /// or whose changes are out of replay order. A manifest failing
    /// this check is treated as malformed and quarantined.
    pub fn validate(&self) -> Result<()> {
        if self.batch_id.is_empty() {
            return Err(StrataError::Manifest("empty batch_id".into()));
        }
        if self.change_count != self.changes.len() {
            return Err(StrataError::Manifest(format!(
                "batch {}: change_count {} does not match {} changes",
                self.batch_id,
                self.change_count,
                self.changes.len()
            )));
        }
        for pair in self.changes.windows(2) {
            if pair[0].sort_key() >= pair[1].sort_key() {
                return Err(StrataError::Manifest(format!(
                    "batch {}: changes out of order at key {}",
                    self.batch_id, pair[1].business_key
                )));
            }
        }
        Ok(())
    }
}
