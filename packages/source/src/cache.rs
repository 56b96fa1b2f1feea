//! On-disk cache for raw provider payloads.
//!
//! Entries are written to a temp file first, then renamed, so a reader
//! never sees a partial file. Concurrent writers of the same key produce
//! identical content; the last rename wins.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::SourceError;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A directory of cached payloads keyed by file name.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Returns the cached bytes for `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the file exists but cannot be read.
    pub async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, SourceError> {
        match tokio::fs::read(self.path(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores `bytes` under `name` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the directory or file cannot be
    /// written.
    pub async fn put(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, SourceError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path(name);
        let tmp_path = self
            .dir
            .join(format!(
                ".{name}.{}.{}.tmp",
                std::process::id(),
                TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
            ));

        tokio::fs::write(&tmp_path, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        log::debug!("Cached {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }
}
