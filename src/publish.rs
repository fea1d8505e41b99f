//! Publish coordinator: durable write first, then broadcast.

use crate::error::{FeedError, FeedResult};
use crate::store::ItemStore;
use crate::subscriptions::{BroadcastReport, NotificationBus};
use crate::types::{ItemDraft, NewsItem};
use parking_lot::Mutex;
use std::sync::Arc;

/// Outcome of a successful publish.
#[derive(Clone, Debug)]
pub struct Published {
    pub item: NewsItem,
    pub report: BroadcastReport,
}

/// Turns a publish request into a store write followed by a broadcast.
///
/// The broadcast only happens after the store acknowledged the write, so a
/// client that re-fetches after a push always finds the item. The reverse is
/// not guaranteed: a fetch racing a publish can miss an item whose push then
/// arrives just after.
pub struct PublishCoordinator<S: ItemStore> {
    store: Arc<S>,
    bus: NotificationBus,
    /// Held across write and broadcast so pushes leave in commit order.
    publish_lock: Mutex<()>,
}

impl<S: ItemStore> PublishCoordinator<S> {
    pub fn new(store: Arc<S>, bus: NotificationBus) -> Self {
        Self {
            store,
            bus,
            publish_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Validate, persist and broadcast. Returns the stored item.
    pub fn publish(&self, draft: ItemDraft) -> FeedResult<NewsItem> {
        self.publish_with_report(draft).map(|published| published.item)
    }

    /// Like `publish`, also returning the broadcast counts.
    pub fn publish_with_report(&self, draft: ItemDraft) -> FeedResult<Published> {
        let input = draft.validate().map_err(|e| {
            tracing::debug!(error = %e, "rejected publish");
            FeedError::from(e)
        })?;

        let _lock = self.publish_lock.lock();

        let item = self.store.create(input).map_err(|e| {
            tracing::warn!(error = %e, "failed to persist item, nothing broadcast");
            FeedError::from(e)
        })?;

        let report = self.bus.broadcast(&item);

        tracing::info!(
            item = %item.id,
            category = %item.category,
            delivered = report.delivered,
            "published item"
        );

        Ok(Published { item, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::subscriptions::{ConnectOptions, Connection, SubscriptionRegistry};
    use crate::types::{Category, Topic};

    fn setup() -> (Arc<MemoryStore>, Arc<SubscriptionRegistry>, PublishCoordinator<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let bus = NotificationBus::new(Arc::clone(&registry));
        let coordinator = PublishCoordinator::new(Arc::clone(&store), bus);
        (store, registry, coordinator)
    }

    #[test]
    fn test_publish_persists_then_broadcasts() {
        let (store, registry, coordinator) = setup();
        let conn = Connection::open(Arc::clone(&registry), ConnectOptions::default());
        conn.subscribe(Category::Tech);

        let published = coordinator
            .publish_with_report(ItemDraft::new("T1", "C1", "Tech"))
            .unwrap();
        assert_eq!(published.report.delivered, 1);

        let pushed = conn.try_recv().unwrap().into_item();
        assert_eq!(pushed, published.item);
        assert_eq!(store.get(pushed.id).unwrap(), Some(pushed));
    }

    #[test]
    fn test_validation_failure_has_no_effects() {
        let (store, registry, coordinator) = setup();
        let conn = Connection::open(Arc::clone(&registry), ConnectOptions::default());
        conn.subscribe(Topic::All);

        for draft in [
            ItemDraft::new("", "C1", "Tech"),
            ItemDraft::new("T1", "", "Tech"),
            ItemDraft::new("T1", "C1", "Nonexistent"),
        ] {
            let err = coordinator.publish(draft).unwrap_err();
            assert!(err.is_validation());
        }

        assert_eq!(store.len().unwrap(), 0);
        assert!(conn.try_recv().is_err());
    }

    #[test]
    fn test_persistence_failure_has_no_broadcast() {
        let (store, registry, coordinator) = setup();
        let conn = Connection::open(Arc::clone(&registry), ConnectOptions::default());
        conn.subscribe(Category::Tech);

        store.set_available(false);
        let err = coordinator.publish(ItemDraft::new("T1", "C1", "Tech")).unwrap_err();
        assert!(err.is_persistence());
        assert!(conn.try_recv().is_err());

        store.set_available(true);
        assert_eq!(store.len().unwrap(), 0);
    }
}
