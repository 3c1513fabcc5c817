use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Watermark error: {0}")]
    Watermark(String),

    #[error("Change source error: {0}")]
    Source(String),

    #[error("Dimension store error: {0}")]
    Dimension(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Run metadata error: {0}")]
    RunMetadata(String),

    #[error("Consistency fault: {0}")]
    Consistency(String),

    #[error("Lock acquisition timed out after {timeout_ms}ms")]
    LockTimeout { timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl StrataError {
    /// Whether retrying the same operation can reasonably succeed.
    ///
    /// Consistency faults and malformed input never become valid on
    /// retry; infrastructure errors (IO, lock waits, store access) may.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StrataError::Io(_)
                | StrataError::Source(_)
                | StrataError::Dimension(_)
                | StrataError::Ledger(_)
                | StrataError::LockTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
