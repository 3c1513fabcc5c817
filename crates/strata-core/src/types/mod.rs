pub mod change;
pub mod dimension;
pub mod run;

pub use change::{Attributes, BatchManifest, ChangeRecord, Operation};
pub use dimension::{DimensionRow, DimensionStats, NewDimensionRow};
pub use run::{RunId, RunMetrics, RunStatus};
