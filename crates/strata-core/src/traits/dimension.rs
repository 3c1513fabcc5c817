use crate::error::Result;
use crate::types::{DimensionRow, DimensionStats, NewDimensionRow};
use chrono::{DateTime, Utc};

/// Mutation handle over the historical dimension. All writes for one
/// logical change happen inside a single transaction: nothing is
/// visible to readers until `commit`, and dropping the handle without
/// committing rolls everything back.
pub trait DimensionTxn {
    /// Current version for a key, read under the transaction so the
    /// read-compare-write sequence is consistent.
    fn current_row(&mut self, business_key: &str) -> Result<Option<DimensionRow>>;

    /// Close the current version: set `valid_to`, clear `is_current`.
    /// Returns false when the key has no current version.
    fn expire_current(&mut self, business_key: &str, valid_to: DateTime<Utc>) -> Result<bool>;

    /// Insert a new current version, returning its surrogate key.
    ///
    /// Must fail with `StrataError::Consistency` if another current
    /// version already exists for the key.
    fn insert_version(&mut self, row: &NewDimensionRow) -> Result<i64>;

    fn commit(self) -> Result<()>;

    fn rollback(self);
}

/// The versioned output store. Only the SCD2 loader mutates it.
pub trait DimensionStore {
    type Txn<'a>: DimensionTxn
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Txn<'_>>;

    /// Current version for a key, outside any transaction.
    fn current_row(&self, business_key: &str) -> Result<Option<DimensionRow>>;

    /// Full history for a key, ordered by `valid_from` ascending.
    fn history(&self, business_key: &str) -> Result<Vec<DimensionRow>>;

    fn stats(&self) -> Result<DimensionStats>;
}
