//! File-backed durable artifacts: batch manifests and the watermark.
//!
//! These are the only coupling between the extractor and the loader;
//! either side may be restarted without coordinating with the other.

mod store;
mod watermark;

pub use store::{ManifestStore, ManifestStoreConfig};
pub use watermark::WatermarkStore;
