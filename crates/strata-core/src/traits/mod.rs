pub mod dimension;
pub mod ledger;
pub mod run;
pub mod source;

pub use dimension::{DimensionStore, DimensionTxn};
pub use ledger::IdempotencyLedger;
pub use run::RunRecorder;
pub use source::{ChangeSource, PageCursor, SourceChange};
