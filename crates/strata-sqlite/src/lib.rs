//! SQLite-backed stores for the strata pipeline.
//!
//! The historical dimension, idempotency ledger, and run metadata live
//! in one database file and can share a connection; the change source
//! reads a separate operational database.

mod ledger;
mod row;
mod run_metadata;
mod schema;
mod source;
mod store;
mod txn;

pub use ledger::SqliteLedger;
pub use run_metadata::SqliteRunRecorder;
pub use source::SqliteChangeSource;
pub use store::SqliteDimensionStore;
pub use txn::SqliteDimensionTxn;
