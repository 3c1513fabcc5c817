//! Timestamp encoding shared by every durable artifact.
//!
//! All persisted timestamps are RFC 3339 UTC with fixed microsecond
//! precision, so lexicographic comparison of the stored text agrees
//! with `DateTime` comparison. Stores rely on this for range queries.

use crate::error::{Result, StrataError};
use chrono::{DateTime, SecondsFormat, Utc};

/// Encode a timestamp for persistence.
pub fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a persisted timestamp.
pub fn decode_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StrataError::Serialization(format!("invalid timestamp {:?}: {}", s, e)))
}
