//! Strata core: types and traits for the SCD2 change-capture pipeline
//!
//! This crate defines the shared abstractions for a change-data-capture
//! pipeline that materializes source mutations into a historically
//! versioned dimension:
//! - Change source (consumed): queryable relation with a last-modified
//!   timestamp per row
//! - Batch manifest: durable, ordered unit of extracted work
//! - Historical dimension: SCD Type 2 versioned output store
//! - Idempotency ledger: append-only set of applied batch ids
//! - Run metadata: per-invocation status and metrics
//!
//! Key properties:
//! - At most one current version per business key, at every committed
//!   state
//! - Contiguous, non-overlapping validity timelines per key
//! - Idempotent, order-tolerant batch replay (ledger plus stale-skip)
//! - Extraction and load are failure-independent, coupled only through
//!   durable artifacts

pub mod config;
pub mod error;
pub mod lock_manager;
pub mod time;
pub mod traits;
pub mod types;

pub use config::{
    DeletePolicy, DimensionConfig, ExtractorConfig, LoaderConfig, SynchronousMode,
};
pub use error::{Result, StrataError};
pub use lock_manager::{KeyLockGuard, LockManager};
pub use traits::{
    ChangeSource, DimensionStore, DimensionTxn, IdempotencyLedger, PageCursor, RunRecorder,
    SourceChange,
};
pub use types::{
    Attributes, BatchManifest, ChangeRecord, DimensionRow, DimensionStats, NewDimensionRow,
    Operation, RunId, RunMetrics, RunStatus,
};
