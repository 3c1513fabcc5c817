//! Change extraction: polls a [`ChangeSource`] above the persisted
//! watermark and publishes durable batch manifests.
//!
//! [`ChangeSource`]: strata_core::traits::ChangeSource

mod extractor;

pub use extractor::Extractor;
