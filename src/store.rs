//! Item storage: the `ItemStore` seam and the durable file-backed store.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::records::{ItemIndex, ItemLog, LogEntry};
use crate::types::{ItemId, ItemInput, NewsItem, Topic};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::num::NonZeroUsize;
use std::path::Path;

/// Durable storage for news items.
///
/// Implementations assign ids and creation times. `list` returns items newest
/// first; `Topic::All` lists every item and an unknown label lists nothing.
pub trait ItemStore: Send + Sync {
    /// Persist a new item. Once this returns `Ok`, the item is visible to
    /// `get` and `list`.
    fn create(&self, input: ItemInput) -> Result<NewsItem>;

    /// Get an item by id.
    fn get(&self, id: ItemId) -> Result<Option<NewsItem>>;

    /// List items under a topic, newest first.
    fn list(&self, topic: &Topic) -> Result<Vec<NewsItem>>;

    /// Delete an item. Returns false if no such item exists.
    fn delete(&self, id: ItemId) -> Result<bool>;

    /// Number of stored items.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"NWS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

const LOG_FILE: &str = "items.log";

/// File-backed item store.
///
/// Layout: `MANIFEST` (magic + version), `LOCK` (exclusive process lock),
/// `items.log` (append-only entries). The index is rebuilt from the log on
/// open.
pub struct FileStore {
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    log: ItemLog,

    index: ItemIndex,

    /// Recently read or written items.
    cache: Mutex<LruCache<ItemId, NewsItem>>,

    /// Serializes create/delete so log order matches index order.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let log = ItemLog::open_with_sync_interval(config.path.join(LOG_FILE), config.sync_every)?;

        tracing::info!(path = %config.path.display(), "created item store");

        Ok(Self::assemble(config, lock_file, log, ItemIndex::new()))
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let log = ItemLog::open_with_sync_interval(config.path.join(LOG_FILE), config.sync_every)?;
        let index = ItemIndex::new();
        Self::rebuild_index(&log, &index)?;

        tracing::info!(
            path = %config.path.display(),
            items = index.count(),
            "opened item store"
        );

        Ok(Self::assemble(config, lock_file, log, index))
    }

    fn assemble(config: StoreConfig, lock_file: File, log: ItemLog, index: ItemIndex) -> Self {
        let cache_size = NonZeroUsize::new(config.item_cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            config,
            _lock_file: lock_file,
            log,
            index,
            cache: Mutex::new(LruCache::new(cache_size)),
            write_lock: Mutex::new(()),
        }
    }

    /// Replay the log into the index.
    fn rebuild_index(log: &ItemLog, index: &ItemIndex) -> Result<()> {
        for result in log.iter_from(0) {
            let (offset, entry) = result?;
            index.apply(offset, &entry);
        }
        Ok(())
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Make the next log sync fail.
    #[cfg(test)]
    pub(crate) fn fail_next_sync(&self) {
        self.log.fail_next_sync();
    }

    fn read_item(&self, id: ItemId, offset: u64) -> Result<NewsItem> {
        if let Some(item) = self.cache.lock().get(&id).cloned() {
            return Ok(item);
        }

        match self.log.read_at(offset)? {
            LogEntry::Item(item) if item.id == id => {
                self.cache.lock().put(id, item.clone());
                Ok(item)
            }
            other => Err(StoreError::InvalidFormat(format!(
                "index points {} at offset {} holding entry for {}",
                id,
                offset,
                other.id()
            ))),
        }
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest = path.join("MANIFEST");
        if !manifest.exists() {
            return Err(StoreError::NotInitialized);
        }
        let mut file = File::open(manifest)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl ItemStore for FileStore {
    fn create(&self, input: ItemInput) -> Result<NewsItem> {
        let _lock = self.write_lock.lock();

        let (item, offset) = self.log.append_item(input)?;
        self.index.add(&item, offset);
        self.cache.lock().put(item.id, item.clone());

        Ok(item)
    }

    fn get(&self, id: ItemId) -> Result<Option<NewsItem>> {
        match self.index.get_offset(id) {
            Some(offset) => Ok(Some(self.read_item(id, offset)?)),
            None => Ok(None),
        }
    }

    fn list(&self, topic: &Topic) -> Result<Vec<NewsItem>> {
        let mut items = Vec::new();
        for offset in self.index.offsets_for(topic) {
            match self.log.read_at(offset)? {
                LogEntry::Item(item) => items.push(item),
                LogEntry::Tombstone { id, .. } => {
                    return Err(StoreError::InvalidFormat(format!(
                        "index points at tombstone for {}",
                        id
                    )))
                }
            }
        }
        Ok(items)
    }

    fn delete(&self, id: ItemId) -> Result<bool> {
        let _lock = self.write_lock.lock();

        if !self.index.contains(id) {
            return Ok(false);
        }

        self.log.append_tombstone(id)?;
        self.index.remove(id);
        self.cache.lock().pop(&id);

        Ok(true)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.index.count())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
