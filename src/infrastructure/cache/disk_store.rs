//! Flat on-disk avatar store: one `<identifier>.<ext>` file per avatar.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::domain::entities::{ImageExtension, UserIdentifier, cache_file_name};
use crate::domain::ports::{AvatarStorePort, CacheError, CacheResult};

const PARTIAL_SUFFIX: &str = ".partial";

/// Avatar store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct DiskAvatarStore {
    dir: PathBuf,
}

impl DiskAvatarStore {
    /// Opens the store, creating the directory if needed.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub async fn new(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache dir: {e}")))?;

        let store = Self { dir };
        store.remove_partials().await;
        Ok(store)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &UserIdentifier, ext: ImageExtension) -> PathBuf {
        self.dir.join(cache_file_name(id, ext))
    }

    /// Deletes temporary files left behind by an interrupted write.
    async fn remove_partials(&self) {
        let Ok(mut entries) = fs::read_dir(&self.dir).await else {
            return;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX) {
                if let Err(e) = fs::remove_file(entry.path()).await {
                    warn!(file = %name, error = %e, "Failed to remove partial write");
                } else {
                    debug!(file = %name, "Removed partial write");
                }
            }
        }
    }

}

/// Writes `bytes` to a hidden temporary file in `dir`, then renames it over
/// `path`. The temporary file is removed if any step fails.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tempfile::Builder::new()
        .prefix(".")
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn io_error(action: &str, path: &Path, e: &std::io::Error) -> CacheError {
    CacheError::IoError(format!("Failed to {action} {}: {e}", path.display()))
}

#[async_trait]
impl AvatarStorePort for DiskAvatarStore {
    async fn list(&self) -> CacheResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error("read", &self.dir, &e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("read", &self.dir, &e))?
        {
            if let Some(name) = entry.file_name().to_str()
                && !name.starts_with('.')
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn read(&self, id: &UserIdentifier, ext: ImageExtension) -> CacheResult<Bytes> {
        let path = self.path(id, ext);
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(path = %path.display(), size = bytes.len(), "Read avatar");
                Ok(Bytes::from(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CacheError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(io_error("read", &path, &e)),
        }
    }

    async fn write(
        &self,
        id: &UserIdentifier,
        ext: ImageExtension,
        bytes: &[u8],
    ) -> CacheResult<()> {
        let path = self.path(id, ext);

        let dir = self.dir.clone();
        let target = path.clone();
        let bytes_owned = bytes.to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes_owned))
            .await
            .map_err(|e| CacheError::IoError(format!("Write task failed: {e}")))?
            .map_err(|e| io_error("write", &path, &e))?;

        debug!(path = %path.display(), size = bytes.len(), "Stored avatar");
        Ok(())
    }

    async fn modified(
        &self,
        id: &UserIdentifier,
        ext: ImageExtension,
    ) -> CacheResult<DateTime<Utc>> {
        let path = self.path(id, ext);
        let meta = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CacheError::NotFound(path.display().to_string())
            } else {
                io_error("stat", &path, &e)
            }
        })?;
        let mtime = meta.modified().map_err(|e| io_error("stat", &path, &e))?;
        Ok(DateTime::<Utc>::from(mtime))
    }

    async fn delete(&self, id: &UserIdentifier, ext: ImageExtension) -> CacheResult<()> {
        let path = self.path(id, ext);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted avatar");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete", &path, &e)),
        }
    }
}
