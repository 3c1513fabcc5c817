use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use strata_core::error::{Result, StrataError};
use strata_core::types::BatchManifest;

const QUARANTINE_DIR: &str = "quarantine";
const TMP_PREFIX: &str = ".tmp-";

/// Configuration for the file-backed manifest store
#[derive(Debug, Clone)]
pub struct ManifestStoreConfig {
    /// Base directory for manifest files
    pub base_dir: PathBuf,
}

impl ManifestStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

/// Durable store of batch manifests.
///
/// Manifests are published with write-then-rename so a reader never
/// observes a partial file; once published they are never mutated.
/// Unreadable manifests are moved into a quarantine subdirectory, not
/// deleted.
pub struct ManifestStore {
    config: ManifestStoreConfig,
}

impl ManifestStore {
    /// Open or create the manifest directory (and its quarantine
    /// subdirectory). Temp files left behind by a crashed publish are
    /// removed; the batch they belonged to was never published, so the
    /// next extraction re-covers its window.
    pub fn open(config: ManifestStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.base_dir)?;
        fs::create_dir_all(config.base_dir.join(QUARANTINE_DIR))?;

        let store = Self { config };
        store.reap_temp_files()?;
        Ok(store)
    }

    fn reap_temp_files(&self) -> Result<()> {
        for entry in fs::read_dir(&self.config.base_dir)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if path.is_file() && name.starts_with(TMP_PREFIX) {
                fs::remove_file(&path)?;
                tracing::warn!("Removed stale temp file {}", path.display());
            }
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    fn manifest_path(&self, batch_id: &str) -> PathBuf {
        self.config.base_dir.join(format!("{}.json", batch_id))
    }

    /// Durably publish a manifest.
    ///
    /// The manifest is serialized to a temporary file, synced, then
    /// renamed into place. Returns the published path.
    pub fn publish(&self, manifest: &BatchManifest) -> Result<PathBuf> {
        manifest.validate()?;

        let final_path = self.manifest_path(&manifest.batch_id);
        if final_path.exists() {
            return Err(StrataError::Manifest(format!(
                "batch {} already published",
                manifest.batch_id
            )));
        }

        let tmp_path = self
            .config
            .base_dir
            .join(format!("{}{}.json", TMP_PREFIX, manifest.batch_id));

        let mut file = File::create(&tmp_path)?;
        serde_json::to_writer(&mut file, manifest)
            .map_err(|e| StrataError::Serialization(e.to_string()))?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &final_path)?;

        tracing::info!(
            "Published batch {} ({} changes) to {}",
            manifest.batch_id,
            manifest.change_count,
            final_path.display()
        );

        Ok(final_path)
    }

    /// Paths of all published manifests in arrival (filename) order.
    ///
    /// The scan is ledger-unaware; the loader filters already-applied
    /// batches itself.
    pub fn pending(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        for entry in fs::read_dir(&self.config.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            // Skip in-flight temp files; a crashed publish leaves one
            // behind but never a partial published manifest.
            if name.starts_with(TMP_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            paths.push(path);
        }

        paths.sort();
        Ok(paths)
    }

    /// Load and validate a published manifest.
    pub fn load(&self, path: &Path) -> Result<BatchManifest> {
        let data = fs::read_to_string(path)?;
        let manifest: BatchManifest = serde_json::from_str(&data).map_err(|e| {
            StrataError::Manifest(format!("{}: unparseable manifest: {}", path.display(), e))
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Move a malformed manifest aside so it is excluded from further
    /// processing but available for operator inspection.
    pub fn quarantine(&self, path: &Path) -> Result<PathBuf> {
        let name = path
            .file_name()
            .ok_or_else(|| StrataError::Manifest(format!("{}: no file name", path.display())))?;
        let dest = self.config.base_dir.join(QUARANTINE_DIR).join(name);
        fs::rename(path, &dest)?;
        tracing::warn!("Quarantined manifest {} -> {}", path.display(), dest.display());
        Ok(dest)
    }

    /// Number of quarantined manifests on disk.
    pub fn quarantined_count(&self) -> Result<usize> {
        let dir = self.config.base_dir.join(QUARANTINE_DIR);
        Ok(fs::read_dir(dir)?.count())
    }

    /// Delete published manifests older than `retention` (by file
    /// modification time) for which `applied` returns true. A manifest
    /// not yet applied is never deleted, no matter how old; quarantined
    /// manifests are never swept. Returns the number removed.
    pub fn sweep_older_than<F>(&self, retention: Duration, mut applied: F) -> Result<usize>
    where
        F: FnMut(&str) -> Result<bool>,
    {
        let cutoff = SystemTime::now()
            .checked_sub(retention)
            .ok_or_else(|| StrataError::Config("retention exceeds system clock range".into()))?;

        let mut removed = 0;
        for path in self.pending()? {
            let modified = fs::metadata(&path)?.modified()?;
            if modified >= cutoff {
                continue;
            }
            let batch_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if !applied(batch_id)? {
                tracing::debug!("Keeping expired but unapplied manifest {}", path.display());
                continue;
            }
            fs::remove_file(&path)?;
            tracing::info!("Swept expired manifest {}", path.display());
            removed += 1;
        }
        Ok(removed)
    }
}
