//! In-process item store.
//!
//! Keeps items in memory only. Can be switched unavailable to simulate a
//! storage outage: every call then fails with `StoreError::Unavailable`.

use crate::error::{Result, StoreError};
use crate::store::ItemStore;
use crate::types::{sort_newest_first, ItemId, ItemInput, NewsItem, Timestamp, Topic};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

struct Items {
    next_id: u64,
    last_timestamp: Timestamp,
    by_id: BTreeMap<ItemId, NewsItem>,
}

pub struct MemoryStore {
    items: RwLock<Items>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Items {
                next_id: 1,
                last_timestamp: Timestamp(0),
                by_id: BTreeMap::new(),
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore for MemoryStore {
    fn create(&self, input: ItemInput) -> Result<NewsItem> {
        self.check()?;

        let mut items = self.items.write();
        let id = ItemId(items.next_id);
        let created_at = Timestamp::now().max(items.last_timestamp);
        let item = input.into_item(id, created_at);

        items.next_id += 1;
        items.last_timestamp = created_at;
        items.by_id.insert(id, item.clone());

        Ok(item)
    }

    fn get(&self, id: ItemId) -> Result<Option<NewsItem>> {
        self.check()?;
        Ok(self.items.read().by_id.get(&id).cloned())
    }

    fn list(&self, topic: &Topic) -> Result<Vec<NewsItem>> {
        self.check()?;

        let mut items: Vec<NewsItem> = self
            .items
            .read()
            .by_id
            .values()
            .filter(|item| topic.matches(item.category))
            .cloned()
            .collect();
        sort_newest_first(&mut items);

        Ok(items)
    }

    fn delete(&self, id: ItemId) -> Result<bool> {
        self.check()?;
        Ok(self.items.write().by_id.remove(&id).is_some())
    }

    fn len(&self) -> Result<usize> {
        self.check()?;
        Ok(self.items.read().by_id.len())
    }
}
