//! Cache index plus the write/remove ordering that keeps it in sync with
//! the store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{
    CacheEntry, DecodedAvatar, ImageExtension, UserIdentifier, parse_cache_file_name,
};
use crate::domain::ports::{AvatarStorePort, CacheError, CacheResult};

/// In-memory view of which identifiers are cached and under which extension.
#[derive(Debug, Default)]
pub struct CacheIndex {
    entries: RwLock<HashMap<UserIdentifier, ImageExtension>>,
}

impl CacheIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from raw directory entries, skipping names that are
    /// not `<identifier>.<ext>`.
    pub fn from_file_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = HashMap::new();
        for name in names {
            let name = name.as_ref();
            if let Some((id, ext)) = parse_cache_file_name(name) {
                entries.insert(id, ext);
            } else {
                debug!(file = name, "Ignoring unrecognised file in cache directory");
            }
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    #[must_use]
    pub fn has(&self, id: &UserIdentifier) -> bool {
        self.entries.read().contains_key(id)
    }

    #[must_use]
    pub fn extension_of(&self, id: &UserIdentifier) -> Option<ImageExtension> {
        self.entries.read().get(id).copied()
    }

    /// Records `id` as cached, returning the previous extension.
    pub fn insert(&self, id: UserIdentifier, ext: ImageExtension) -> Option<ImageExtension> {
        self.entries.write().insert(id, ext)
    }

    /// Forgets `id` only if it is still recorded under `ext`.
    pub fn remove_if(&self, id: &UserIdentifier, ext: ImageExtension) -> bool {
        let mut entries = self.entries.write();
        if entries.get(id) == Some(&ext) {
            entries.remove(id);
            true
        } else {
            false
        }
    }

    fn replace(&self, other: Self) {
        *self.entries.write() = other.entries.into_inner();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache index backed by an [`AvatarStorePort`].
///
/// Writes reach the store before the index, and removals leave the index
/// last, so the index never claims a file that is not there.
pub struct AvatarCache {
    index: CacheIndex,
    store: Arc<dyn AvatarStorePort>,
    removing: Mutex<HashSet<UserIdentifier>>,
}

impl AvatarCache {
    #[must_use]
    pub fn new(store: Arc<dyn AvatarStorePort>) -> Self {
        Self {
            index: CacheIndex::new(),
            store,
            removing: Mutex::new(HashSet::new()),
        }
    }

    /// Repopulates the index from the store's listing.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be listed.
    pub async fn rebuild(&self) -> CacheResult<usize> {
        let names = self.store.list().await?;
        self.index.replace(CacheIndex::from_file_names(names));
        let count = self.index.len();
        info!(entries = count, "Avatar cache index rebuilt");
        Ok(count)
    }

    #[must_use]
    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    #[must_use]
    pub fn has(&self, id: &UserIdentifier) -> bool {
        self.index.has(id)
    }

    #[must_use]
    pub fn extension_of(&self, id: &UserIdentifier) -> Option<ImageExtension> {
        self.index.extension_of(id)
    }

    /// Reads a cached avatar.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the identifier is not indexed, or the store
    /// error. A file that vanished behind our back is dropped from the index.
    pub async fn read(&self, id: &UserIdentifier) -> CacheResult<(ImageExtension, Bytes)> {
        let ext = self
            .extension_of(id)
            .ok_or_else(|| CacheError::NotFound(id.to_string()))?;

        match self.store.read(id, ext).await {
            Ok(bytes) => {
                trace!(id = %id, ext = %ext, size = bytes.len(), "Cache hit");
                Ok((ext, bytes))
            }
            Err(e @ CacheError::NotFound(_)) => {
                warn!(id = %id, "Indexed avatar missing from store, dropping index entry");
                self.index.remove_if(id, ext);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Persists `avatar`, then indexes it.
    ///
    /// # Errors
    ///
    /// Returns the store error; the index is untouched in that case.
    pub async fn write(&self, id: &UserIdentifier, avatar: &DecodedAvatar) -> CacheResult<()> {
        self.store.write(id, avatar.extension, &avatar.bytes).await?;

        let previous = self.index.insert(id.clone(), avatar.extension);
        debug!(id = %id, ext = %avatar.extension, size = avatar.bytes.len(), "Cached avatar");

        if let Some(old) = previous
            && old != avatar.extension
            && let Err(e) = self.store.delete(id, old).await
        {
            warn!(id = %id, ext = %old, error = %e, "Failed to remove superseded avatar");
        }

        Ok(())
    }

    /// Deletes the cached avatar, then drops it from the index.
    ///
    /// Returns `Ok(false)` if nothing was cached or another removal of the
    /// same identifier is already running.
    ///
    /// # Errors
    ///
    /// Returns the store error; the index keeps the entry in that case.
    pub async fn remove(&self, id: &UserIdentifier) -> CacheResult<bool> {
        let Some(ext) = self.extension_of(id) else {
            return Ok(false);
        };
        if !self.removing.lock().insert(id.clone()) {
            return Ok(false);
        }

        let result = self.store.delete(id, ext).await;
        if result.is_ok() {
            self.index.remove_if(id, ext);
            debug!(id = %id, ext = %ext, "Evicted avatar");
        }
        self.removing.lock().remove(id);

        result.map(|()| true)
    }

    /// Modification time of the cached file.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the identifier is not indexed, or the store error.
    pub async fn stat_mtime(&self, id: &UserIdentifier) -> CacheResult<DateTime<Utc>> {
        let ext = self
            .extension_of(id)
            .ok_or_else(|| CacheError::NotFound(id.to_string()))?;
        self.store.modified(id, ext).await
    }

    /// Full cache entry for the freshness check.
    ///
    /// # Errors
    ///
    /// Same as [`Self::stat_mtime`].
    pub async fn entry(&self, id: &UserIdentifier) -> CacheResult<CacheEntry> {
        let ext = self
            .extension_of(id)
            .ok_or_else(|| CacheError::NotFound(id.to_string()))?;
        let mtime = self.store.modified(id, ext).await?;
        Ok(CacheEntry {
            identifier: id.clone(),
            extension: ext,
            mtime,
        })
    }
}
