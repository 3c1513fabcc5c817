use serde::{Deserialize, Serialize};

/// What a DELETE does to a key's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Close the current version; the key has no current row afterward.
    #[default]
    CloseOnly,
    /// Close the current version and insert a terminal current row
    /// carrying the last known snapshot, marked with the DELETE
    /// operation.
    Tombstone,
}

/// Configuration for the SCD2 loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Sleep between scans for unapplied manifests (ms).
    /// Default: 5000
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub delete_policy: DeletePolicy,

    /// Number of key-lock stripes.
    /// Default: 256
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,

    /// Key-lock acquisition timeout (ms).
    /// Default: 5000
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Attempts per manifest before the run is marked failed.
    /// Default: 5
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Sleep between retries of a transiently failing manifest (ms).
    /// Default: 1000
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Sleep after a failed run before the next one (ms).
    /// Default: 5000
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_lock_stripes() -> usize {
    256
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> usize {
    5
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_error_backoff_ms() -> u64 {
    5000
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            delete_policy: DeletePolicy::default(),
            lock_stripes: default_lock_stripes(),
            lock_timeout_ms: default_lock_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }
}
