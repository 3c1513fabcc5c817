//! SCD2 apply: turns ordered batch manifests into versioned dimension
//! rows with full-batch idempotence and a stale-skip backstop.

mod loader;

pub use loader::{ApplyOutcome, Scd2Loader};
