use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use strata_core::error::Result;
use strata_core::time::{decode_ts, encode_ts};

const WATERMARK_FILE: &str = "watermark";

/// File-persisted extraction cursor.
///
/// Read once at extractor startup, rewritten only after a batch has
/// been durably published. The write goes through a temp file and
/// rename so a crash never leaves a torn cursor.
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            path: base_dir.join(WATERMARK_FILE),
        })
    }

    /// Load the persisted watermark.
    ///
    /// A missing file means no extraction has completed yet. An
    /// unreadable file is treated the same way, with a warning: the
    /// extractor falls back to its initial lookback and the ledger
    /// plus stale-skip downstream make the re-read harmless.
    pub fn load(&self) -> Result<Option<DateTime<Utc>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&self.path)?;
        match decode_ts(data.trim()) {
            Ok(ts) => Ok(Some(ts)),
            Err(e) => {
                tracing::warn!(
                    "Unreadable watermark at {}, falling back to initial lookback: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Atomically persist a new watermark.
    pub fn save(&self, ts: DateTime<Utc>) -> Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, encode_ts(ts))?;
        fs::rename(&tmp_path, &self.path)?;
        tracing::debug!("Saved watermark {}", encode_ts(ts));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_missing_watermark_is_none() {
        let temp = TempDir::new().unwrap();
        let store = WatermarkStore::open(temp.path()).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = WatermarkStore::open(temp.path()).unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
            + chrono::Duration::microseconds(42);
        store.save(ts).unwrap();
        assert_eq!(store.load().unwrap(), Some(ts));

        // Monotonic advance overwrites.
        let later = ts + chrono::Duration::seconds(30);
        store.save(later).unwrap();
        assert_eq!(store.load().unwrap(), Some(later));
    }

    #[test]
    fn test_corrupt_watermark_falls_back_to_none() {
        let temp = TempDir::new().unwrap();
        let store = WatermarkStore::open(temp.path()).unwrap();

        std::fs::write(temp.path().join("watermark"), b"garbage").unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
