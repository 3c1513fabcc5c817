use crate::error::Result;
use chrono::{DateTime, Utc};

/// Append-only record of applied batches. Existence of an entry is the
/// sole authority for "already applied".
pub trait IdempotencyLedger {
    fn contains(&self, batch_id: &str) -> Result<bool>;

    /// Record a batch as applied. Appending an already-present batch id
    /// is an error; callers check membership first.
    fn append(&self, batch_id: &str, applied_at: DateTime<Utc>) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
