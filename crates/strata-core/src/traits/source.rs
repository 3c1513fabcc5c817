use crate::error::Result;
use crate::types::{Attributes, Operation};
use chrono::{DateTime, Utc};

/// One row from the change source: an entity's snapshot plus the
/// source-side last-modified timestamp.
#[derive(Debug, Clone)]
pub struct SourceChange {
    pub business_key: String,
    pub attributes: Attributes,
    pub operation: Operation,
    pub changed_at: DateTime<Utc>,
}

/// Keyset-pagination cursor over `(changed_at, business_key)`.
#[derive(Debug, Clone)]
pub struct PageCursor {
    pub changed_at: DateTime<Utc>,
    pub business_key: String,
}

impl PageCursor {
    pub fn from_change(change: &SourceChange) -> Self {
        Self {
            changed_at: change.changed_at,
            business_key: change.business_key.clone(),
        }
    }
}

/// A queryable relation exposing a business key and a monotonically
/// non-decreasing last-modified timestamp per row. Consumed by the
/// extractor, never mutated by this pipeline.
pub trait ChangeSource {
    /// Fetch up to `limit` changes with `newer_than < changed_at <=
    /// no_later_than`, ordered by `(changed_at, business_key)`
    /// ascending, resuming after `cursor` when given.
    fn fetch_page(
        &self,
        newer_than: DateTime<Utc>,
        no_later_than: DateTime<Utc>,
        cursor: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<SourceChange>>;
}
