use crate::types::change::{Attributes, Operation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One historical version of an entity in the dimension.
///
/// Per business key, rows ordered by `valid_from` form a contiguous,
/// non-overlapping timeline with at most one row where
/// `is_current = true` (equivalently `valid_to` is NULL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionRow {
    /// Opaque, monotonic, assigned by the dimension on insert.
    pub surrogate_key: i64,

    pub business_key: String,

    pub attributes: Attributes,

    pub valid_from: DateTime<Utc>,

    /// NULL iff this row is the current version.
    pub valid_to: Option<DateTime<Utc>>,

    pub is_current: bool,

    /// Operation on the change record that produced this version.
    pub source_operation: Operation,

    /// Batch that produced this version.
    pub source_batch_id: String,

    pub created_at: DateTime<Utc>,
}

/// A version to insert. The dimension assigns `surrogate_key` and
/// `created_at`; every inserted version starts current.
#[derive(Debug, Clone)]
pub struct NewDimensionRow {
    pub business_key: String,
    pub attributes: Attributes,
    pub valid_from: DateTime<Utc>,
    pub source_operation: Operation,
    pub source_batch_id: String,
}

/// Summary counts over the dimension, reported into run metadata
/// after each loader invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionStats {
    pub total_rows: u64,
    pub current_rows: u64,
    pub historical_rows: u64,
    pub unique_keys: u64,
    pub earliest_valid_from: Option<DateTime<Utc>>,
    pub latest_valid_from: Option<DateTime<Utc>>,
}
