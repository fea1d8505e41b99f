//! In-memory index over the item log.

use crate::records::LogEntry;
use crate::types::{Category, ItemId, NewsItem, Timestamp, Topic};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Location and sort key of a live item.
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    category: Category,
    created_at: Timestamp,
}

/// Maps live item ids to log offsets, and categories to creation-ordered ids.
///
/// Not persisted: rebuilt from the log on open.
pub struct ItemIndex {
    by_id: RwLock<HashMap<ItemId, IndexEntry>>,
    /// category -> (created_at, id), ascending.
    by_category: RwLock<HashMap<Category, BTreeSet<(Timestamp, ItemId)>>>,
}

impl ItemIndex {
    pub fn new() -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
            by_category: RwLock::new(HashMap::new()),
        }
    }

    /// Index a stored item at `offset`.
    pub fn add(&self, item: &NewsItem, offset: u64) {
        let mut by_id = self.by_id.write();
        let mut by_category = self.by_category.write();

        let previous = by_id.insert(
            item.id,
            IndexEntry {
                offset,
                category: item.category,
                created_at: item.created_at,
            },
        );
        // A later entry for the same id replaces the earlier one everywhere.
        if let Some(previous) = previous {
            if let Some(set) = by_category.get_mut(&previous.category) {
                set.remove(&(previous.created_at, item.id));
            }
        }
        by_category
            .entry(item.category)
            .or_default()
            .insert((item.created_at, item.id));
    }

    /// Forget an item. Returns whether it was indexed.
    pub fn remove(&self, id: ItemId) -> bool {
        let mut by_id = self.by_id.write();
        let mut by_category = self.by_category.write();

        match by_id.remove(&id) {
            Some(entry) => {
                if let Some(set) = by_category.get_mut(&entry.category) {
                    set.remove(&(entry.created_at, id));
                }
                true
            }
            None => false,
        }
    }

    /// Replay one log entry (used when rebuilding on open).
    pub fn apply(&self, offset: u64, entry: &LogEntry) {
        match entry {
            LogEntry::Item(item) => self.add(item, offset),
            LogEntry::Tombstone { id, .. } => {
                self.remove(*id);
            }
        }
    }

    /// Get the log offset of a live item.
    pub fn get_offset(&self, id: ItemId) -> Option<u64> {
        self.by_id.read().get(&id).map(|e| e.offset)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.by_id.read().contains_key(&id)
    }

    /// Offsets of live items under `topic`, newest first.
    pub fn offsets_for(&self, topic: &Topic) -> Vec<u64> {
        let by_id = self.by_id.read();
        let by_category = self.by_category.read();

        let mut keys: Vec<(Timestamp, ItemId)> = match topic {
            Topic::All => by_category.values().flatten().copied().collect(),
            Topic::Category(category) => by_category
                .get(category)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
            Topic::Unknown(_) => Vec::new(),
        };
        keys.sort_unstable_by(|a, b| b.cmp(a));

        keys.into_iter()
            .filter_map(|(_, id)| by_id.get(&id).map(|e| e.offset))
            .collect()
    }

    /// Number of live items.
    pub fn count(&self) -> usize {
        self.by_id.read().len()
    }
}

impl Default for ItemIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, category: Category, ts: i64) -> NewsItem {
        NewsItem {
            id: ItemId(id),
            title: format!("title {}", id),
            content: "content".into(),
            category,
            created_at: Timestamp(ts),
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let index = ItemIndex::new();
        index.add(&item(1, Category::Tech, 10), 0);

        assert_eq!(index.get_offset(ItemId(1)), Some(0));
        assert_eq!(index.get_offset(ItemId(2)), None);
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn test_offsets_newest_first() {
        let index = ItemIndex::new();
        index.add(&item(1, Category::Tech, 10), 0);
        index.add(&item(2, Category::Sports, 20), 100);
        index.add(&item(3, Category::Tech, 30), 200);

        assert_eq!(index.offsets_for(&Topic::from(Category::Tech)), vec![200, 0]);
        assert_eq!(index.offsets_for(&Topic::All), vec![200, 100, 0]);
        assert!(index.offsets_for(&Topic::parse("Weather")).is_empty());
        assert!(index.offsets_for(&Topic::from(Category::Health)).is_empty());
    }

    #[test]
    fn test_repeated_id_keeps_latest_entry_only() {
        let index = ItemIndex::new();
        index.add(&item(1, Category::Tech, 10), 0);
        index.add(&item(1, Category::Sports, 20), 100);

        assert_eq!(index.count(), 1);
        assert_eq!(index.get_offset(ItemId(1)), Some(100));
        assert_eq!(index.offsets_for(&Topic::All), vec![100]);
        assert!(index.offsets_for(&Topic::from(Category::Tech)).is_empty());
    }

    #[test]
    fn test_tombstone_removes() {
        let index = ItemIndex::new();
        index.apply(0, &LogEntry::Item(item(1, Category::Tech, 10)));
        index.apply(
            50,
            &LogEntry::Tombstone {
                id: ItemId(1),
                timestamp: Timestamp(11),
            },
        );

        assert!(!index.contains(ItemId(1)));
        assert!(index.offsets_for(&Topic::All).is_empty());
        assert!(!index.remove(ItemId(1)));
    }
}
