use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use strata_core::error::{Result, StrataError};
use strata_core::time::encode_ts;
use strata_core::traits::IdempotencyLedger;

/// Append-only set of applied batch ids, stored next to the dimension
/// so it shares the same durability settings.
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        let ledger = Self { conn };
        ledger.init()?;
        Ok(ledger)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "CREATE TABLE IF NOT EXISTS batch_ledger (
                    batch_id TEXT PRIMARY KEY,
                    applied_at TEXT NOT NULL
                )",
                [],
            )
            .map_err(|e| StrataError::Ledger(e.to_string()))?;
        Ok(())
    }
}

impl IdempotencyLedger for SqliteLedger {
    fn contains(&self, batch_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT 1 FROM batch_ledger WHERE batch_id = ?1",
            [batch_id],
            |_| Ok(()),
        )
        .map(|_| true)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(false),
            other => Err(StrataError::Ledger(other.to_string())),
        })
    }

    fn append(&self, batch_id: &str, applied_at: DateTime<Utc>) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO batch_ledger (batch_id, applied_at) VALUES (?1, ?2)",
                params![batch_id, encode_ts(applied_at)],
            )
            .map_err(|e| StrataError::Ledger(e.to_string()))?;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM batch_ledger", [], |row| row.get(0))
            .map_err(|e| StrataError::Ledger(e.to_string()))?;
        Ok(count as usize)
    }
}
