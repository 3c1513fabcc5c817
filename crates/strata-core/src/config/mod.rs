pub mod dimension;
pub mod extractor;
pub mod loader;

pub use dimension::{DimensionConfig, SynchronousMode};
pub use extractor::ExtractorConfig;
pub use loader::{DeletePolicy, LoaderConfig};
