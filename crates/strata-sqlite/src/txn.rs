use chrono::{DateTime, Utc};
use parking_lot::MutexGuard;
use rusqlite::{params, Connection, ErrorCode};
use strata_core::error::{Result, StrataError};
use strata_core::time::encode_ts;
use strata_core::traits::DimensionTxn;
use strata_core::types::{DimensionRow, NewDimensionRow};

use crate::row::{decode_row, read_raw, ROW_COLUMNS};

/// One atomic unit of dimension mutation.
///
/// Holds the connection guard for its whole lifetime, so a transaction
/// also serializes store access. Rolls back on drop unless committed.
pub struct SqliteDimensionTxn<'a> {
    conn: MutexGuard<'a, Connection>,
    in_txn: bool,
}

impl<'a> SqliteDimensionTxn<'a> {
    pub(crate) fn new(conn: MutexGuard<'a, Connection>) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE TRANSACTION")
            .map_err(|e| StrataError::Dimension(e.to_string()))?;
        Ok(Self { conn, in_txn: true })
    }
}

impl DimensionTxn for SqliteDimensionTxn<'_> {
    fn current_row(&mut self, business_key: &str) -> Result<Option<DimensionRow>> {
        let sql = format!(
            "SELECT {} FROM dimension_history WHERE business_key = ?1 AND is_current = 1",
            ROW_COLUMNS
        );
        let raw = self
            .conn
            .query_row(&sql, [business_key], read_raw)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StrataError::Dimension(other.to_string())),
            })?;

        raw.map(decode_row).transpose()
    }

    fn expire_current(&mut self, business_key: &str, valid_to: DateTime<Utc>) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE dimension_history
                 SET valid_to = ?1, is_current = 0
                 WHERE business_key = ?2 AND is_current = 1",
                params![encode_ts(valid_to), business_key],
            )
            .map_err(|e| StrataError::Dimension(e.to_string()))?;

        Ok(changed > 0)
    }

    fn insert_version(&mut self, row: &NewDimensionRow) -> Result<i64> {
        let attributes = serde_json::to_string(&row.attributes)
            .map_err(|e| StrataError::Serialization(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO dimension_history (
                    business_key, attributes, valid_from, valid_to, is_current,
                    source_operation, source_batch_id, created_at
                ) VALUES (?1, ?2, ?3, NULL, 1, ?4, ?5, ?6)",
                params![
                    row.business_key,
                    attributes,
                    encode_ts(row.valid_from),
                    row.source_operation.as_str(),
                    row.source_batch_id,
                    encode_ts(Utc::now()),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    StrataError::Consistency(format!(
                        "current-row constraint violated for key {}: {}",
                        row.business_key, e
                    ))
                }
                other => StrataError::Dimension(other.to_string()),
            })?;

        Ok(self.conn.last_insert_rowid())
    }

    fn commit(mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| StrataError::Dimension(e.to_string()))?;
        self.in_txn = false;
        Ok(())
    }

    fn rollback(mut self) {
        let _ = self.conn.execute_batch("ROLLBACK");
        self.in_txn = false;
    }
}

impl Drop for SqliteDimensionTxn<'_> {
    fn drop(&mut self) {
        if self.in_txn {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
