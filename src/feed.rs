//! The news feed: store, subscriptions and publishing behind one handle.

use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult, Result};
use crate::publish::{PublishCoordinator, Published};
use crate::store::{FileStore, ItemStore};
use crate::subscriptions::{ConnectOptions, Connection, NotificationBus, SubscriptionRegistry};
use crate::sync::FeedView;
use crate::types::{ItemDraft, ItemId, NewsItem, Topic};
use std::sync::Arc;

/// A news feed over an item store.
///
/// Share it between request handlers behind an `Arc`; every method takes
/// `&self`.
pub struct NewsFeed<S: ItemStore> {
    store: Arc<S>,
    registry: Arc<SubscriptionRegistry>,
    coordinator: PublishCoordinator<S>,
    connection_buffer: usize,
}

impl NewsFeed<FileStore> {
    /// Open (or create) a file-backed feed.
    pub fn open(config: FeedConfig) -> Result<Self> {
        let store = FileStore::open_or_create(config.store)?;
        Ok(Self::with_buffer(store, config.connection_buffer))
    }
}

impl<S: ItemStore> NewsFeed<S> {
    pub fn new(store: S) -> Self {
        Self::with_buffer(store, FeedConfig::default().connection_buffer)
    }

    /// Build a feed whose connections queue at most `connection_buffer` pushes.
    pub fn with_buffer(store: S, connection_buffer: usize) -> Self {
        Self::from_shared(Arc::new(store), connection_buffer)
    }

    pub fn from_shared(store: Arc<S>, connection_buffer: usize) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let bus = NotificationBus::new(Arc::clone(&registry));
        let coordinator = PublishCoordinator::new(Arc::clone(&store), bus);

        Self {
            store,
            registry,
            coordinator,
            connection_buffer,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &NotificationBus {
        self.coordinator.bus()
    }

    // --- Items ---

    /// Validate, store and broadcast a new item.
    pub fn publish(&self, draft: ItemDraft) -> FeedResult<NewsItem> {
        self.coordinator.publish(draft)
    }

    pub fn publish_with_report(&self, draft: ItemDraft) -> FeedResult<Published> {
        self.coordinator.publish_with_report(draft)
    }

    /// Backlog for a category or "all", newest first.
    pub fn list(&self, topic: impl Into<Topic>) -> FeedResult<Vec<NewsItem>> {
        Ok(self.store.list(&topic.into())?)
    }

    pub fn get(&self, id: ItemId) -> FeedResult<NewsItem> {
        self.store.get(id)?.ok_or(FeedError::NotFound(id))
    }

    /// Delete an item. Connected clients are not notified.
    pub fn delete(&self, id: ItemId) -> FeedResult<()> {
        if self.store.delete(id)? {
            tracing::info!(item = %id, "deleted item");
            Ok(())
        } else {
            Err(FeedError::NotFound(id))
        }
    }

    // --- Connections ---

    /// Open a connection with the feed's default outbox size.
    pub fn connect(&self) -> Connection {
        self.connect_with(ConnectOptions {
            label: None,
            buffer_size: self.connection_buffer,
        })
    }

    pub fn connect_with(&self, options: ConnectOptions) -> Connection {
        Connection::open(Arc::clone(&self.registry), options)
    }

    /// Number of connections holding at least one subscription.
    pub fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count()
    }

    /// Bring a (re)connecting client up to date.
    ///
    /// Subscribes `connection` to `topics` first, then fetches the backlog for
    /// `backlog` and merges any pushes that arrived meanwhile. An item
    /// published between the subscribe and the fetch shows up in both and is
    /// kept once. Subscribing after the fetch instead would leave a window in
    /// which an item is neither fetched nor pushed.
    ///
    /// Only pushes under `backlog` are merged into the view; pushes for other
    /// subscribed topics stay queued on the connection. Fails with
    /// `Disconnected` if the connection is already closed.
    pub fn sync<I, T>(
        &self,
        connection: &Connection,
        topics: I,
        backlog: impl Into<Topic>,
    ) -> FeedResult<FeedView>
    where
        I: IntoIterator<Item = T>,
        T: Into<Topic>,
    {
        if !connection.is_connected() {
            tracing::warn!(connection = %connection.id(), "sync on a closed connection");
            return Err(FeedError::Disconnected(connection.id()));
        }
        for topic in topics {
            connection.subscribe(topic);
        }

        let mut view = FeedView::new(backlog);
        let fetched = self.list(view.topic().clone())?;
        let from_backlog = view.apply_backlog(fetched);
        let from_pushes = view.drain_pushes(connection);

        tracing::debug!(
            connection = %connection.id(),
            backlog = from_backlog,
            pushes = from_pushes,
            "client synced"
        );

        Ok(view)
    }
}
