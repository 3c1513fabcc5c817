use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use strata_core::error::{Result, StrataError};
use strata_core::time::{decode_ts, encode_ts};
use strata_core::traits::{ChangeSource, PageCursor, SourceChange};
use strata_core::types::{Attributes, Operation};

/// Change source over an operational SQLite table.
///
/// Expects a `source_entities` relation with a business key, a JSON
/// attribute snapshot, `created_at` / `last_modified` timestamps, and
/// a nullable `deleted_at` soft-delete marker. Mutation kind is
/// derived the way the watermark scan sees it: `deleted_at` set means
/// DELETE, `created_at` inside the window means INSERT, anything else
/// is an UPDATE.
pub struct SqliteChangeSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChangeSource {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| StrataError::Source(e.to_string()))?;
        tracing::info!("Change source opened at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_conn(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Create the operational table. Owned by the upstream system in
    /// production; exposed for fixtures and local runs.
    pub fn init_schema(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS source_entities (
                    business_key TEXT PRIMARY KEY,
                    attributes TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    last_modified TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_source_entities_modified
                    ON source_entities(last_modified, business_key);",
            )
            .map_err(|e| StrataError::Source(e.to_string()))?;
        Ok(())
    }

    /// The underlying connection, for fixtures that mutate the source.
    pub fn conn(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

impl ChangeSource for SqliteChangeSource {
    fn fetch_page(
        &self,
        newer_than: DateTime<Utc>,
        no_later_than: DateTime<Utc>,
        cursor: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<SourceChange>> {
        let conn = self.conn.lock();

        // Fixed-precision RFC 3339 text, so SQL comparison is time
        // comparison.
        let since = encode_ts(newer_than);
        let until = encode_ts(no_later_than);

        let sql = "SELECT business_key, attributes, created_at, last_modified, deleted_at
             FROM source_entities
             WHERE last_modified > ?1 AND last_modified <= ?2
               AND (last_modified > ?3 OR (last_modified = ?3 AND business_key > ?4))
             ORDER BY last_modified, business_key
             LIMIT ?5";

        // No cursor: resume from the window start with an empty key,
        // which every business key sorts after.
        let (cursor_ts, cursor_key) = match cursor {
            Some(c) => (encode_ts(c.changed_at), c.business_key.clone()),
            None => (since.clone(), String::new()),
        };

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StrataError::Source(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![since, until, cursor_ts, cursor_key, limit as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .map_err(|e| StrataError::Source(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StrataError::Source(e.to_string()))?;

        let mut changes = Vec::with_capacity(rows.len());
        for (business_key, attributes, created_at, last_modified, deleted_at) in rows {
            let attributes: Attributes = serde_json::from_str(&attributes)
                .map_err(|e| StrataError::Source(format!("{}: {}", business_key, e)))?;
            let created_at = decode_ts(&created_at)?;
            let changed_at = decode_ts(&last_modified)?;

            let operation = if deleted_at.is_some() {
                Operation::Delete
            } else if created_at > newer_than {
                Operation::Insert
            } else {
                Operation::Update
            };

            changes.push(SourceChange {
                business_key,
                attributes,
                operation,
                changed_at,
            });
        }

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn setup() -> SqliteChangeSource {
        let conn = Connection::open_in_memory().unwrap();
        let source = SqliteChangeSource::from_conn(Arc::new(Mutex::new(conn)));
        source.init_schema().unwrap();
        source
    }

    fn seed(source: &SqliteChangeSource, key: &str, created: DateTime<Utc>, modified: DateTime<Utc>, deleted: Option<DateTime<Utc>>) {
        source
            .conn()
            .lock()
            .execute(
                "INSERT INTO source_entities (business_key, attributes, created_at, last_modified, deleted_at)
                 VALUES (?1, '{\"status\":\"pending\"}', ?2, ?3, ?4)",
                params![key, encode_ts(created), encode_ts(modified), deleted.map(encode_ts)],
            )
            .unwrap();
    }

    #[test]
    fn test_window_and_operation_classification() {
        let source = setup();
        let watermark = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let until = watermark + chrono::Duration::minutes(10);

        let before = watermark - chrono::Duration::minutes(1);
        let inside = watermark + chrono::Duration::minutes(1);
        let late = until + chrono::Duration::minutes(1);

        // Created before the window, modified inside: UPDATE.
        seed(&source, "order-1", before, inside, None);
        // Created inside the window: INSERT.
        seed(&source, "order-2", inside, inside, None);
        // Soft-deleted inside the window: DELETE.
        seed(&source, "order-3", before, inside, Some(inside));
        // Modified after the window bound: excluded.
        seed(&source, "order-4", late, late, None);

        let page = source.fetch_page(watermark, until, None, 100).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].operation, Operation::Update);
        assert_eq!(page[1].operation, Operation::Insert);
        assert_eq!(page[2].operation, Operation::Delete);
    }

    #[test]
    fn test_keyset_pagination_resumes_after_cursor() {
        let source = setup();
        let watermark = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let until = watermark + chrono::Duration::minutes(10);
        let ts = watermark + chrono::Duration::minutes(1);

        // Same last_modified for all three; ties broken by key.
        for key in ["order-a", "order-b", "order-c"] {
            seed(&source, key, ts, ts, None);
        }

        let first = source.fetch_page(watermark, until, None, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].business_key, "order-a");
        assert_eq!(first[1].business_key, "order-b");

        let cursor = PageCursor::from_change(&first[1]);
        let rest = source.fetch_page(watermark, until, Some(&cursor), 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].business_key, "order-c");
    }

    #[test]
    fn test_row_at_watermark_is_excluded() {
        let source = setup();
        let watermark = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        seed(&source, "order-1", watermark, watermark, None);

        let page = source
            .fetch_page(watermark, watermark + chrono::Duration::minutes(1), None, 10)
            .unwrap();
        assert!(page.is_empty());
    }
}
