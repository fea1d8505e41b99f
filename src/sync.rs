//! Client-side reconciliation of backlog fetches and live pushes.

use crate::subscriptions::Connection;
use crate::types::{newest_first, ItemId, NewsItem, Topic};
use std::collections::HashSet;

/// A client's local copy of the feed, newest first.
///
/// Items are keyed by id, so an item that arrives both in a backlog fetch and
/// as a push is shown once. Items outside the view's topic are ignored.
#[derive(Clone, Debug)]
pub struct FeedView {
    topic: Topic,
    items: Vec<NewsItem>,
    seen: HashSet<ItemId>,
}

impl FeedView {
    pub fn new(topic: impl Into<Topic>) -> Self {
        Self {
            topic: topic.into(),
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Merge a fetch result. Returns how many items were new.
    pub fn apply_backlog(&mut self, items: impl IntoIterator<Item = NewsItem>) -> usize {
        items
            .into_iter()
            .filter(|item| self.insert(item.clone()))
            .count()
    }

    /// Insert a pushed item unless already present. Returns whether it was new.
    pub fn apply_push(&mut self, item: NewsItem) -> bool {
        self.insert(item)
    }

    /// Apply the pushes waiting on `connection` that fall under this view's
    /// topic. Returns how many were new.
    ///
    /// Pushes for other topics stay queued on the connection.
    pub fn drain_pushes(&mut self, connection: &Connection) -> usize {
        connection
            .take_matching(&self.topic)
            .into_iter()
            .filter(|item| self.insert(item.clone()))
            .count()
    }

    /// Forget an item, e.g. after a delete.
    pub fn remove(&mut self, id: ItemId) -> bool {
        if !self.seen.remove(&id) {
            return false;
        }
        self.items.retain(|item| item.id != id);
        true
    }

    pub fn items(&self) -> &[NewsItem] {
        &self.items
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id).collect()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.seen.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn insert(&mut self, item: NewsItem) -> bool {
        if !self.topic.matches(item.category) || !self.seen.insert(item.id) {
            return false;
        }
        let pos = self
            .items
            .binary_search_by(|other| newest_first(other, &item))
            .unwrap_or_else(|pos| pos);
        self.items.insert(pos, item);
        true
    }
}

impl Default for FeedView {
    fn default() -> Self {
        Self::new(Topic::All)
    }
}
