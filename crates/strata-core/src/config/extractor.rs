use serde::{Deserialize, Serialize};

/// Configuration for the change extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Duration subtracted from "now" when bounding the extraction
    /// window, so rows whose write is still in flight (or clock-skewed)
    /// are never read (ms).
    /// Default: 2000
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,

    /// Maximum rows fetched per source page.
    /// Default: 500
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Window to look back on first startup, before any watermark has
    /// been persisted (ms).
    /// Default: 300000 (5 minutes)
    #[serde(default = "default_initial_lookback_ms")]
    pub initial_lookback_ms: u64,

    /// Sleep between polls of the change source (ms).
    /// Default: 10000
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Sleep after a failed poll before retrying (ms).
    /// Default: 5000
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

fn default_safety_margin_ms() -> u64 {
    2000
}

fn default_page_size() -> usize {
    500
}

fn default_initial_lookback_ms() -> u64 {
    300_000
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_error_backoff_ms() -> u64 {
    5000
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            safety_margin_ms: default_safety_margin_ms(),
            page_size: default_page_size(),
            initial_lookback_ms: default_initial_lookback_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl ExtractorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_safety_margin_ms(mut self, ms: u64) -> Self {
        self.safety_margin_ms = ms;
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_initial_lookback_ms(mut self, ms: u64) -> Self {
        self.initial_lookback_ms = ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }
}
