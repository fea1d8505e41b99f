//! Subscription registry: which connections want which topics.

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{ConnectionId, ServerMessage};
use crate::types::{Category, Topic};

/// Result of handing one push to a connection's outbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Full,
    Disconnected,
}

/// A registered connection: its id plus the sending half of its outbox.
#[derive(Clone, Debug)]
pub struct Subscriber {
    pub id: ConnectionId,
    outbox: Sender<ServerMessage>,
}

impl Subscriber {
    pub(crate) fn new(id: ConnectionId, outbox: Sender<ServerMessage>) -> Self {
        Self { id, outbox }
    }

    /// Queue a push without blocking.
    pub fn try_deliver(&self, message: ServerMessage) -> Delivery {
        match self.outbox.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Disconnected(_)) => Delivery::Disconnected,
        }
    }
}

/// Topic -> member connections.
///
/// One lock covers the whole map, so a reader never observes a half-applied
/// subscribe, unsubscribe or drop.
pub struct SubscriptionRegistry {
    topics: RwLock<HashMap<Topic, HashMap<ConnectionId, Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Add `subscriber` to `topic`. Returns false if it was already a member.
    pub fn subscribe(&self, subscriber: &Subscriber, topic: Topic) -> bool {
        let mut topics = self.topics.write();
        let members = topics.entry(topic).or_default();
        members.insert(subscriber.id, subscriber.clone()).is_none()
    }

    /// Remove `id` from `topic`. Returns false if it was not a member.
    pub fn unsubscribe(&self, id: ConnectionId, topic: &Topic) -> bool {
        let mut topics = self.topics.write();
        let Some(members) = topics.get_mut(topic) else {
            return false;
        };
        let removed = members.remove(&id).is_some();
        if members.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    /// Remove `id` from every topic. Returns how many memberships it held.
    pub fn drop_connection(&self, id: ConnectionId) -> usize {
        let mut topics = self.topics.write();
        let mut removed = 0;
        topics.retain(|_, members| {
            if members.remove(&id).is_some() {
                removed += 1;
            }
            !members.is_empty()
        });
        removed
    }

    /// Connections subscribed to `topic`, plus every "all" subscriber.
    ///
    /// Each connection appears once even if subscribed to both.
    pub fn members_of(&self, topic: &Topic) -> Vec<Subscriber> {
        let topics = self.topics.read();
        let mut members: HashMap<ConnectionId, Subscriber> = HashMap::new();

        for key in [topic, &Topic::All] {
            if let Some(set) = topics.get(key) {
                for (id, sub) in set {
                    members.entry(*id).or_insert_with(|| sub.clone());
                }
            }
        }

        let mut members: Vec<Subscriber> = members.into_values().collect();
        members.sort_by_key(|s| s.id);
        members
    }

    /// Run `visit` on every member for `category` while holding the read lock.
    ///
    /// Mutations wait until the visit finishes, so once `drop_connection`
    /// returns no later visit reaches that connection.
    pub fn visit_members<F>(&self, category: Category, mut visit: F)
    where
        F: FnMut(&Subscriber),
    {
        let topics = self.topics.read();
        let direct = topics.get(&Topic::Category(category));
        let wildcard = topics.get(&Topic::All);

        if let Some(direct) = direct {
            direct.values().for_each(&mut visit);
        }
        if let Some(wildcard) = wildcard {
            wildcard
                .values()
                .filter(|sub| direct.map_or(true, |d| !d.contains_key(&sub.id)))
                .for_each(&mut visit);
        }
    }

    pub fn is_member(&self, id: ConnectionId, topic: &Topic) -> bool {
        self.topics
            .read()
            .get(topic)
            .map_or(false, |members| members.contains_key(&id))
    }

    /// Number of distinct connections with at least one membership.
    pub fn subscriber_count(&self) -> usize {
        let topics = self.topics.read();
        let mut ids: Vec<ConnectionId> = topics.values().flat_map(|m| m.keys().copied()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
