//! LRU cache of note previews for source tooltips.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use uuid::Uuid;

use quill_core::NoteMeta;

/// Default capacity of the preview cache.
pub const DEFAULT_META_CACHE_CAPACITY: usize = 256;

/// Bounded cache of [`NoteMeta`] keyed by (owner, note id).
///
/// Populated as tool results flow through a turn so that source previews do
/// not round-trip to the repository for recently touched notes. The owner is
/// part of the key, so one owner's cached previews are invisible to another.
pub struct NoteMetaCache {
    inner: Mutex<LruCache<(Uuid, Uuid), NoteMeta>>,
}

impl NoteMetaCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_META_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Insert or refresh a preview.
    pub fn put(&self, owner_id: Uuid, meta: NoteMeta) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put((owner_id, meta.id), meta);
        }
    }

    /// Look up a preview, marking it recently used.
    pub fn get(&self, owner_id: Uuid, id: Uuid) -> Option<NoteMeta> {
        self.inner
            .lock()
            .ok()
            .and_then(|mut c| c.get(&(owner_id, id)).cloned())
    }

    /// Drop a preview after a delete.
    pub fn invalidate(&self, owner_id: Uuid, id: Uuid) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.pop(&(owner_id, id));
        }
    }
}

impl Default for NoteMetaCache {
    fn default() -> Self {
        Self::new()
    }
}
