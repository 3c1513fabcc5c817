use strata_core::error::{Result, StrataError};
use strata_core::time::decode_ts;
use strata_core::types::{Attributes, DimensionRow, Operation};

/// Columns selected whenever a full dimension row is fetched; keep in
/// sync with [`decode_row`].
pub(crate) const ROW_COLUMNS: &str = "surrogate_key, business_key, attributes, valid_from, \
     valid_to, is_current, source_operation, source_batch_id, created_at";

/// Raw column values as stored, before timestamp/JSON decoding.
pub(crate) type RawRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    i64,
    String,
    String,
    String,
);

pub(crate) fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

pub(crate) fn decode_row(raw: RawRow) -> Result<DimensionRow> {
    let (
        surrogate_key,
        business_key,
        attributes,
        valid_from,
        valid_to,
        is_current,
        source_operation,
        source_batch_id,
        created_at,
    ) = raw;

    let attributes: Attributes = serde_json::from_str(&attributes)
        .map_err(|e| StrataError::Serialization(format!("attributes: {}", e)))?;

    Ok(DimensionRow {
        surrogate_key,
        business_key,
        attributes,
        valid_from: decode_ts(&valid_from)?,
        valid_to: valid_to.as_deref().map(decode_ts).transpose()?,
        is_current: is_current != 0,
        source_operation: Operation::parse(&source_operation)?,
        source_batch_id,
        created_at: decode_ts(&created_at)?,
    })
}
