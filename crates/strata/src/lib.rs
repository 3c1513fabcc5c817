//! Strata: a CDC to SCD Type 2 pipeline
//!
//! Strata turns an operational table's mutations into a full
//! historical dimension:
//! - **Extractor**: polls the change source above a durable watermark
//!   and publishes ordered batch manifests (file-backed, write-then-
//!   rename)
//! - **SCD2 loader**: applies manifests to the dimension with exactly
//!   one current row per business key, contiguous validity intervals,
//!   and idempotent replay backed by a batch ledger
//! - **Run metadata**: every loader pass is recorded with status and
//!   counters
//!
//! # Quick Start
//!
//! ```no_run
//! use strata::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let pipeline = Pipeline::open(PipelineConfig::new("./data", "./source.db"))?;
//!
//! // Capture one batch of changes, then apply it.
//! pipeline.extract_once()?;
//! let report = pipeline.run_loader_once();
//! println!("{:?}: {} applied", report.status, report.metrics.records_applied);
//!
//! // Query the dimension.
//! let history = pipeline.dimension().history("order-1")?;
//! # Ok(())
//! # }
//! ```

pub mod pipeline;
pub mod prelude;
pub mod shutdown;

// Re-export core types
pub use strata_core::{
    config::{DeletePolicy, DimensionConfig, ExtractorConfig, LoaderConfig, SynchronousMode},
    error::{Result, StrataError},
    time::{decode_ts, encode_ts},
    traits::{
        ChangeSource, DimensionStore, DimensionTxn, IdempotencyLedger, PageCursor, RunRecorder,
        SourceChange,
    },
    types::{
        Attributes, BatchManifest, ChangeRecord, DimensionRow, DimensionStats, NewDimensionRow,
        Operation, RunId, RunMetrics, RunStatus,
    },
    LockManager,
};

// Re-export implementations
pub use strata_extractor::Extractor;
pub use strata_loader::{ApplyOutcome, Scd2Loader};
pub use strata_manifest::{ManifestStore, ManifestStoreConfig, WatermarkStore};
pub use strata_sqlite::{SqliteChangeSource, SqliteDimensionStore, SqliteLedger, SqliteRunRecorder};

// Re-export main types from this crate
pub use pipeline::{ExtractorLoop, LoaderLoop, LoaderRunReport, Pipeline, PipelineConfig};
pub use shutdown::ShutdownFlag;
