use rusqlite::Connection;
use strata_core::config::{DimensionConfig, SynchronousMode};
use strata_core::error::{Result, StrataError};

/// Apply connection pragmas from the dimension config.
pub fn configure_connection(conn: &Connection, cfg: &DimensionConfig) -> Result<()> {
    if cfg.wal_mode {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StrataError::Config(e.to_string()))?;
    }

    let sync_mode = match cfg.synchronous {
        SynchronousMode::Full => "FULL",
        SynchronousMode::Normal => "NORMAL",
        SynchronousMode::Off => "OFF",
    };
    conn.pragma_update(None, "synchronous", sync_mode)
        .map_err(|e| StrataError::Config(e.to_string()))?;

    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| StrataError::Config(e.to_string()))?;

    conn.pragma_update(None, "cache_size", cfg.cache_size)
        .map_err(|e| StrataError::Config(e.to_string()))?;

    // Bounded wait on a locked database; expiry rolls the transaction
    // back in full and the record is retried on the next pass.
    conn.pragma_update(None, "busy_timeout", cfg.busy_timeout_ms as i64)
        .map_err(|e| StrataError::Config(e.to_string()))?;

    Ok(())
}

/// Create the SCD2 history table with its integrity constraints.
///
/// The partial unique index on `(business_key) WHERE is_current = 1`
/// is the storage-level enforcement of "at most one current version
/// per key", independent of the loader's own checks.
pub fn init_dimension_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS dimension_history (
            surrogate_key INTEGER PRIMARY KEY AUTOINCREMENT,
            business_key TEXT NOT NULL,
            attributes TEXT NOT NULL,
            valid_from TEXT NOT NULL,
            valid_to TEXT,
            is_current INTEGER NOT NULL DEFAULT 1,
            source_operation TEXT NOT NULL,
            source_batch_id TEXT NOT NULL,
            created_at TEXT NOT NULL,

            CONSTRAINT dimension_history_valid_time_check
                CHECK (valid_to IS NULL OR valid_to > valid_from),
            CONSTRAINT dimension_history_current_check
                CHECK (is_current = 1 OR valid_to IS NOT NULL)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_dimension_history_current_key
            ON dimension_history(business_key) WHERE is_current = 1;
        CREATE INDEX IF NOT EXISTS idx_dimension_history_business_key
            ON dimension_history(business_key);
        CREATE INDEX IF NOT EXISTS idx_dimension_history_validity
            ON dimension_history(valid_from, valid_to);
        CREATE INDEX IF NOT EXISTS idx_dimension_history_batch_id
            ON dimension_history(source_batch_id);",
    )
    .map_err(|e| StrataError::Dimension(e.to_string()))?;

    Ok(())
}
