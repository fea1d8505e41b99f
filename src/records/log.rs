//! Append-only item log.

use crate::error::{Result, StoreError};
use crate::types::{ItemId, ItemInput, NewsItem, Timestamp};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for each log entry.
const LOG_MAGIC: &[u8; 4] = b"NWS\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

const KIND_ITEM: u8 = 0;
const KIND_TOMBSTONE: u8 = 1;

/// One entry in the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogEntry {
    /// A created item.
    Item(NewsItem),
    /// Deletion marker for an earlier item.
    Tombstone { id: ItemId, timestamp: Timestamp },
}

impl LogEntry {
    pub fn id(&self) -> ItemId {
        match self {
            LogEntry::Item(item) => item.id,
            LogEntry::Tombstone { id, .. } => *id,
        }
    }
}

struct LogInner {
    file: File,
    next_id: u64,
    file_size: u64,
    last_timestamp: Timestamp,
    writes_since_sync: u64,
}

/// Append-only log of item and tombstone entries.
///
/// Entry layout (little endian):
/// magic(4) version(1) kind(1) id(8) timestamp(8) body_len(4) body checksum(4).
/// Item bodies are MessagePack-encoded `ItemInput`; tombstones have no body.
pub struct ItemLog {
    path: PathBuf,
    inner: Mutex<LogInner>,
    /// Sync every N writes (1 = every write).
    sync_interval: u64,
    #[cfg(test)]
    fail_next_sync: std::sync::atomic::AtomicBool,
}

impl ItemLog {
    /// Default sync interval: every write, items are small and rare.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 1;

    /// Open or create a log with the default sync interval.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a log, syncing to disk every `sync_interval` writes.
    ///
    /// A torn entry at the tail (crash mid-append) is truncated away. Any other
    /// unreadable entry is reported as corruption.
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let (valid_size, max_id, last_timestamp) = Self::scan(&mut file)?;
        let file_size = file.metadata()?.len();
        if valid_size < file_size {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = file_size - valid_size,
                "truncating torn entry at end of item log"
            );
            file.set_len(valid_size)?;
            file.sync_all()?;
        }

        Ok(Self {
            path,
            inner: Mutex::new(LogInner {
                file,
                next_id: max_id + 1,
                file_size: valid_size,
                last_timestamp,
                writes_since_sync: 0,
            }),
            sync_interval: sync_interval.max(1),
            #[cfg(test)]
            fail_next_sync: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a new item, assigning its id and creation time.
    ///
    /// Timestamps never go backwards within one log.
    /// Returns the stored item and the offset where it was written.
    pub fn append_item(&self, input: ItemInput) -> Result<(NewsItem, u64)> {
        let body = rmp_serde::to_vec(&input)?;

        let mut inner = self.inner.lock();
        let id = ItemId(inner.next_id);
        let timestamp = Timestamp::now().max(inner.last_timestamp);

        let offset = Self::write_entry(&mut inner, KIND_ITEM, id, timestamp, &body)?;
        // Spent even if the sync fails, so a leftover entry never shares an id.
        inner.next_id += 1;
        if let Err(e) = self.after_write(&mut inner) {
            Self::roll_back(&mut inner, offset);
            return Err(e);
        }

        inner.last_timestamp = timestamp;

        Ok((input.into_item(id, timestamp), offset))
    }

    /// Append a tombstone for `id`. Returns the offset written.
    pub fn append_tombstone(&self, id: ItemId) -> Result<u64> {
        let mut inner = self.inner.lock();
        let timestamp = Timestamp::now().max(inner.last_timestamp);

        let offset = Self::write_entry(&mut inner, KIND_TOMBSTONE, id, timestamp, &[])?;
        if let Err(e) = self.after_write(&mut inner) {
            Self::roll_back(&mut inner, offset);
            return Err(e);
        }

        inner.last_timestamp = timestamp;
        Ok(offset)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.sync_file(&inner.file)?;
        inner.writes_since_sync = 0;
        Ok(())
    }

    /// Read the entry at a given offset.
    pub fn read_at(&self, offset: u64) -> Result<LogEntry> {
        let mut inner = self.inner.lock();
        inner.file.seek(SeekFrom::Start(offset))?;
        Self::read_entry(&mut inner.file)
    }

    /// Iterate all entries from a given offset, in write order.
    pub fn iter_from(&self, offset: u64) -> EntryIterator<'_> {
        EntryIterator {
            log: self,
            offset,
            end: self.size(),
        }
    }

    /// Current file size.
    pub fn size(&self) -> u64 {
        self.inner.lock().file_size
    }

    fn write_entry(
        inner: &mut LogInner,
        kind: u8,
        id: ItemId,
        timestamp: Timestamp,
        body: &[u8],
    ) -> Result<u64> {
        let mut buf = Vec::with_capacity(30 + body.len());
        buf.extend_from_slice(LOG_MAGIC);
        buf.push(LOG_VERSION);
        buf.push(kind);
        buf.extend_from_slice(&id.0.to_le_bytes());
        buf.extend_from_slice(&timestamp.0.to_le_bytes());
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&checksum(kind, id, body).to_le_bytes());

        let offset = inner.file_size;
        inner.file.seek(SeekFrom::Start(offset))?;
        if let Err(e) = inner.file.write_all(&buf) {
            // Drop the partial entry so the next append starts clean.
            let _ = inner.file.set_len(offset);
            return Err(e.into());
        }
        inner.file_size = offset + buf.len() as u64;

        Ok(offset)
    }

    fn after_write(&self, inner: &mut LogInner) -> Result<()> {
        inner.writes_since_sync += 1;
        if inner.writes_since_sync >= self.sync_interval {
            self.sync_file(&inner.file)?;
            inner.writes_since_sync = 0;
        }
        Ok(())
    }

    fn sync_file(&self, file: &File) -> std::io::Result<()> {
        #[cfg(test)]
        if self
            .fail_next_sync
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(std::io::Error::new(ErrorKind::Other, "sync failed"));
        }
        file.sync_all()
    }

    /// Cut an entry whose write did not complete.
    ///
    /// If the cut itself fails the entry stays, but its id is already spent.
    fn roll_back(inner: &mut LogInner, offset: u64) {
        match inner.file.set_len(offset) {
            Ok(()) => inner.file_size = offset,
            Err(e) => tracing::warn!(
                offset,
                error = %e,
                "failed to cut incomplete entry from item log"
            ),
        }
    }

    /// Make the next sync fail.
    #[cfg(test)]
    pub(crate) fn fail_next_sync(&self) {
        self.fail_next_sync
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Read one entry from the current position.
    fn read_entry(file: &mut File) -> Result<LogEntry> {
        let mut header = [0u8; 26];
        file.read_exact(&mut header)?;

        if &header[0..4] != LOG_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid entry magic".into()));
        }
        if header[4] != LOG_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported log version: {}",
                header[4]
            )));
        }

        let kind = header[5];
        let id = ItemId(u64::from_le_bytes(le_bytes(&header[6..14])));
        let timestamp = Timestamp(i64::from_le_bytes(le_bytes(&header[14..22])));
        let body_len = u32::from_le_bytes(le_bytes(&header[22..26])) as usize;

        let mut body = vec![0u8; body_len];
        file.read_exact(&mut body)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = checksum(kind, id, &body);
        if stored != computed {
            return Err(StoreError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        match kind {
            KIND_ITEM => {
                let input: ItemInput = rmp_serde::from_slice(&body)?;
                Ok(LogEntry::Item(input.into_item(id, timestamp)))
            }
            KIND_TOMBSTONE => Ok(LogEntry::Tombstone { id, timestamp }),
            other => Err(StoreError::InvalidFormat(format!(
                "Unknown entry kind: {}",
                other
            ))),
        }
    }

    /// Walk the whole file. Returns (end of last good entry, max id, last timestamp).
    fn scan(file: &mut File) -> Result<(u64, u64, Timestamp)> {
        let file_size = file.metadata()?.len();
        file.seek(SeekFrom::Start(0))?;

        let mut offset = 0u64;
        let mut max_id = 0u64;
        let mut last_timestamp = Timestamp(0);

        while offset < file_size {
            match Self::read_entry(file) {
                Ok(entry) => {
                    max_id = max_id.max(entry.id().0);
                    if let LogEntry::Item(item) = &entry {
                        last_timestamp = last_timestamp.max(item.created_at);
                    }
                    offset = file.stream_position()?;
                }
                Err(StoreError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }

        Ok((offset, max_id, last_timestamp))
    }
}

fn checksum(kind: u8, id: ItemId, body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[kind]);
    hasher.update(&id.0.to_le_bytes());
    hasher.update(body);
    hasher.finalize()
}

/// Read the entry at `offset`, returning it with the offset of the next one.
fn read_entry_at(file: &mut File, offset: u64) -> Result<(LogEntry, u64)> {
    file.seek(SeekFrom::Start(offset))?;
    let entry = ItemLog::read_entry(file)?;
    Ok((entry, file.stream_position()?))
}

fn le_bytes<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

/// Iterator over entries in the log.
pub struct EntryIterator<'a> {
    log: &'a ItemLog,
    offset: u64,
    end: u64,
}

impl<'a> Iterator for EntryIterator<'a> {
    type Item = Result<(u64, LogEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }

        let current = self.offset;
        let result = {
            let mut inner = self.log.inner.lock();
            read_entry_at(&mut inner.file, current)
        };

        match result {
            Ok((entry, next_offset)) => {
                self.offset = next_offset;
                Some(Ok((current, entry)))
            }
            Err(e) => {
                self.offset = self.end;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use tempfile::TempDir;

    fn input(title: &str) -> ItemInput {
        ItemInput {
            title: title.to_string(),
            content: "body".to_string(),
            category: Category::Tech,
        }
    }

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let log = ItemLog::open(dir.path().join("items.log")).unwrap();

        let (item, offset) = log.append_item(input("hello")).unwrap();
        assert_eq!(item.id, ItemId(1));
        assert_eq!(item.title, "hello");
        assert_eq!(offset, 0);

        assert_eq!(log.read_at(offset).unwrap(), LogEntry::Item(item));
    }

    #[test]
    fn test_iterate_items_and_tombstones() {
        let dir = TempDir::new().unwrap();
        let log = ItemLog::open(dir.path().join("items.log")).unwrap();

        for i in 1..=5 {
            log.append_item(input(&format!("item {}", i))).unwrap();
        }
        log.append_tombstone(ItemId(2)).unwrap();

        let entries: Vec<_> = log.iter_from(0).map(|r| r.unwrap().1).collect();
        assert_eq!(entries.len(), 6);
        assert!(matches!(entries[5], LogEntry::Tombstone { id: ItemId(2), .. }));
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let dir = TempDir::new().unwrap();
        let log = ItemLog::open(dir.path().join("items.log")).unwrap();

        let mut last = Timestamp(0);
        for i in 0..20 {
            let (item, _) = log.append_item(input(&i.to_string())).unwrap();
            assert!(item.created_at >= last);
            last = item.created_at;
        }
    }

    #[test]
    fn test_reopen_continues_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.log");

        {
            let log = ItemLog::open(&path).unwrap();
            for i in 1..=3 {
                log.append_item(input(&i.to_string())).unwrap();
            }
        }

        let log = ItemLog::open(&path).unwrap();
        assert_eq!(log.iter_from(0).count(), 3);
        let (item, _) = log.append_item(input("4")).unwrap();
        assert_eq!(item.id, ItemId(4));
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.log");

        let good_size = {
            let log = ItemLog::open(&path).unwrap();
            log.append_item(input("kept")).unwrap();
            log.size()
        };

        // Simulate a crash halfway through a second append.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&LOG_MAGIC[..]).unwrap();
            file.write_all(&[LOG_VERSION, KIND_ITEM, 2, 0]).unwrap();
        }

        let log = ItemLog::open(&path).unwrap();
        assert_eq!(log.size(), good_size);
        assert_eq!(log.iter_from(0).count(), 1);
        let (item, _) = log.append_item(input("next")).unwrap();
        assert_eq!(item.id, ItemId(2));
    }

    #[test]
    fn test_failed_sync_leaves_no_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.log");

        let good_size = {
            let log = ItemLog::open(&path).unwrap();
            log.append_item(input("kept")).unwrap();
            let good_size = log.size();

            log.fail_next_sync();
            assert!(log.append_item(input("lost")).is_err());
            assert_eq!(log.size(), good_size);

            log.fail_next_sync();
            assert!(log.append_tombstone(ItemId(1)).is_err());
            assert_eq!(log.size(), good_size);

            let (next, _) = log.append_item(input("next")).unwrap();
            assert_eq!(next.id, ItemId(3));
            log.size()
        };

        let log = ItemLog::open(&path).unwrap();
        assert_eq!(log.size(), good_size);
        let ids: Vec<ItemId> = log.iter_from(0).map(|r| r.unwrap().1.id()).collect();
        assert_eq!(ids, vec![ItemId(1), ItemId(3)]);
    }

    #[test]
    fn test_corrupted_body_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("items.log");

        {
            let log = ItemLog::open(&path).unwrap();
            log.append_item(input("original")).unwrap();
        }

        // Flip a byte inside the body.
        {
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(28)).unwrap();
            let mut byte = [0u8; 1];
            file.read_exact(&mut byte).unwrap();
            file.seek(SeekFrom::Start(28)).unwrap();
            file.write_all(&[byte[0] ^ 0xff]).unwrap();
        }

        let result = ItemLog::open(&path);
        assert!(matches!(result, Err(StoreError::ChecksumMismatch { .. })));
    }
}
