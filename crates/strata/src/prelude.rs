//! Import this to get all commonly used types and traits:
//!
//! ```
//! use strata::prelude::*;
//! ```

// Core types
pub use crate::{
    Attributes, BatchManifest, ChangeRecord, DimensionRow, DimensionStats, NewDimensionRow,
    Operation, Result, RunId, RunMetrics, RunStatus, StrataError,
};

// Configs
pub use crate::{
    DeletePolicy, DimensionConfig, ExtractorConfig, LoaderConfig, PipelineConfig, SynchronousMode,
};

// Traits
pub use crate::{
    ChangeSource, DimensionStore, DimensionTxn, IdempotencyLedger, RunRecorder, SourceChange,
};

// Implementations
pub use crate::{
    Extractor, ManifestStore, Scd2Loader, SqliteChangeSource, SqliteDimensionStore, SqliteLedger,
    SqliteRunRecorder, WatermarkStore,
};

// Pipeline wiring
pub use crate::{ApplyOutcome, ExtractorLoop, LoaderLoop, LoaderRunReport, Pipeline, ShutdownFlag};
