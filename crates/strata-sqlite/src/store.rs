use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use strata_core::config::DimensionConfig;
use strata_core::error::{Result, StrataError};
use strata_core::time::decode_ts;
use strata_core::traits::DimensionStore;
use strata_core::types::{DimensionRow, DimensionStats};

use crate::row::{decode_row, read_raw, ROW_COLUMNS};
use crate::schema;
use crate::txn::SqliteDimensionTxn;

/// SQLite-backed historical dimension.
pub struct SqliteDimensionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDimensionStore {
    pub fn open(cfg: DimensionConfig) -> Result<Self> {
        if let Some(parent) = cfg.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            &cfg.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| StrataError::Dimension(e.to_string()))?;

        schema::configure_connection(&conn, &cfg)?;
        schema::init_dimension_schema(&conn)?;

        tracing::info!("Dimension store opened at {}", cfg.path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// The underlying connection, shared with the ledger and run
    /// recorder that live in the same database file.
    pub fn conn(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

impl DimensionStore for SqliteDimensionStore {
    type Txn<'a> = SqliteDimensionTxn<'a>;

    fn begin(&self) -> Result<Self::Txn<'_>> {
        SqliteDimensionTxn::new(self.conn.lock())
    }

    fn current_row(&self, business_key: &str) -> Result<Option<DimensionRow>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM dimension_history WHERE business_key = ?1 AND is_current = 1",
            ROW_COLUMNS
        );
        let raw = conn
            .query_row(&sql, [business_key], read_raw)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StrataError::Dimension(other.to_string())),
            })?;

        raw.map(decode_row).transpose()
    }

    fn history(&self, business_key: &str) -> Result<Vec<DimensionRow>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM dimension_history WHERE business_key = ?1 ORDER BY valid_from",
            ROW_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StrataError::Dimension(e.to_string()))?;

        let raws = stmt
            .query_map([business_key], read_raw)
            .map_err(|e| StrataError::Dimension(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StrataError::Dimension(e.to_string()))?;

        raws.into_iter().map(decode_row).collect()
    }

    fn stats(&self) -> Result<DimensionStats> {
        let conn = self.conn.lock();
        let (total, current, historical, unique, earliest, latest) = conn
            .query_row(
                "SELECT
                    COUNT(*),
                    COUNT(CASE WHEN is_current = 1 THEN 1 END),
                    COUNT(CASE WHEN is_current = 0 THEN 1 END),
                    COUNT(DISTINCT business_key),
                    MIN(valid_from),
                    MAX(valid_from)
                 FROM dimension_history",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .map_err(|e| StrataError::Dimension(e.to_string()))?;

        Ok(DimensionStats {
            total_rows: total as u64,
            current_rows: current as u64,
            historical_rows: historical as u64,
            unique_keys: unique as u64,
            earliest_valid_from: earliest.as_deref().map(decode_ts).transpose()?,
            latest_valid_from: latest.as_deref().map(decode_ts).transpose()?,
        })
    }
}
