//! Notification bus: fans a stored item out to its category's subscribers.

use std::sync::Arc;

use super::registry::{Delivery, SubscriptionRegistry};
use super::types::{BroadcastReport, ServerMessage};
use crate::types::NewsItem;

/// Delivers stored items to the connections subscribed to their category.
///
/// Delivery never blocks: each push is queued on the member's bounded
/// outbox. A full outbox loses that push for that member only; a member that
/// went away is skipped. Nothing is retried and nothing is reported back to
/// the publisher beyond the returned counts.
#[derive(Clone)]
pub struct NotificationBus {
    registry: Arc<SubscriptionRegistry>,
}

impl NotificationBus {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Push `item` to every member of its category and of "all", once each.
    pub fn broadcast(&self, item: &NewsItem) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        self.registry.visit_members(item.category, |subscriber| {
            let message = ServerMessage::NewItem { item: item.clone() };
            match subscriber.try_deliver(message) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Full => {
                    report.dropped_full += 1;
                    tracing::warn!(
                        connection = %subscriber.id,
                        item = %item.id,
                        "outbox full, dropping push"
                    );
                }
                Delivery::Disconnected => {
                    report.dropped_disconnected += 1;
                    tracing::trace!(
                        connection = %subscriber.id,
                        item = %item.id,
                        "connection gone, dropping push"
                    );
                }
            }
        });

        tracing::debug!(
            item = %item.id,
            category = %item.category,
            delivered = report.delivered,
            dropped = report.dropped_full + report.dropped_disconnected,
            "broadcast item"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::registry::Subscriber;
    use crate::types::{Category, ItemId, Timestamp, Topic};
    use crossbeam_channel::{bounded, Receiver};
    use std::time::Duration;

    fn item(id: u64, category: Category) -> NewsItem {
        NewsItem {
            id: ItemId(id),
            title: format!("title {}", id),
            content: "content".into(),
            category,
            created_at: Timestamp(id as i64),
        }
    }

    fn member(
        registry: &SubscriptionRegistry,
        capacity: usize,
        topics: &[Topic],
    ) -> (Subscriber, Receiver<ServerMessage>) {
        let (tx, rx) = bounded(capacity);
        let sub = Subscriber::new(registry.next_connection_id(), tx);
        for topic in topics {
            registry.subscribe(&sub, topic.clone());
        }
        (sub, rx)
    }

    #[test]
    fn test_broadcast_targets_category_and_all() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let bus = NotificationBus::new(Arc::clone(&registry));

        let (_a, a_rx) = member(&registry, 8, &[Topic::from(Category::Tech)]);
        let (_b, b_rx) = member(&registry, 8, &[Topic::from(Category::Business)]);
        let (_all, all_rx) = member(&registry, 8, &[Topic::All]);

        let report = bus.broadcast(&item(1, Category::Tech));
        assert_eq!(report.delivered, 2);

        assert_eq!(a_rx.try_recv().unwrap().item().id, ItemId(1));
        assert_eq!(all_rx.try_recv().unwrap().item().id, ItemId(1));
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_member_of_category_and_all_gets_one_copy() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let bus = NotificationBus::new(Arc::clone(&registry));

        let (_s, rx) = member(&registry, 8, &[Topic::from(Category::Tech), Topic::All]);

        bus.broadcast(&item(1, Category::Tech));
        assert!(rx.try_recv().is_ok());
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn test_full_outbox_does_not_block_others() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let bus = NotificationBus::new(Arc::clone(&registry));

        let (_slow, slow_rx) = member(&registry, 1, &[Topic::from(Category::Tech)]);
        let (_fast, fast_rx) = member(&registry, 16, &[Topic::from(Category::Tech)]);

        for i in 1..=5 {
            bus.broadcast(&item(i, Category::Tech));
        }

        let fast: Vec<ItemId> = fast_rx.try_iter().map(|m| m.item().id).collect();
        assert_eq!(fast, (1..=5).map(ItemId).collect::<Vec<_>>());

        // The slow member kept only what fit; it is still subscribed.
        let slow: Vec<ItemId> = slow_rx.try_iter().map(|m| m.item().id).collect();
        assert_eq!(slow, vec![ItemId(1)]);
        assert_eq!(registry.subscriber_count(), 2);
    }

    #[test]
    fn test_gone_connection_is_skipped_silently() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let bus = NotificationBus::new(Arc::clone(&registry));

        let (_gone, gone_rx) = member(&registry, 8, &[Topic::from(Category::Tech)]);
        let (_live, live_rx) = member(&registry, 8, &[Topic::from(Category::Tech)]);
        drop(gone_rx);

        let report = bus.broadcast(&item(1, Category::Tech));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped_disconnected, 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn test_per_connection_order() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let bus = NotificationBus::new(Arc::clone(&registry));
        let (_s, rx) = member(&registry, 64, &[Topic::from(Category::Science)]);

        for i in 1..=20 {
            bus.broadcast(&item(i, Category::Science));
        }

        let received: Vec<u64> = rx.try_iter().map(|m| m.item().id.0).collect();
        assert_eq!(received, (1..=20).collect::<Vec<_>>());
    }
}
