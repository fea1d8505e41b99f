//! A live subscriber connection and its lifecycle.

use crossbeam_channel::{bounded, Receiver, RecvError, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use super::registry::{Subscriber, SubscriptionRegistry};
use super::types::{ClientMessage, ConnectOptions, ConnectionId, ConnectionState, ServerMessage};
use crate::error::FeedResult;
use crate::types::{NewsItem, Topic};

/// One connected client.
///
/// Owns its memberships and the receiving half of its outbox. Transitions are
/// `Connected -> Subscribed(topics) -> Disconnected`; unsubscribing the last
/// topic returns to `Connected`. Dropping the connection disconnects it.
pub struct Connection {
    id: ConnectionId,
    label: Option<String>,
    subscriber: Subscriber,
    receiver: Receiver<ServerMessage>,
    /// Pushes taken off the outbox but passed over by `take_matching`.
    /// Always older than anything still in `receiver`.
    held: Mutex<VecDeque<ServerMessage>>,
    registry: Arc<SubscriptionRegistry>,
    state: Mutex<ConnectionState>,
}

impl Connection {
    pub(crate) fn open(registry: Arc<SubscriptionRegistry>, options: ConnectOptions) -> Self {
        let id = registry.next_connection_id();
        let (sender, receiver) = bounded(options.buffer_size.max(1));

        tracing::debug!(
            connection = %id,
            label = options.label.as_deref().unwrap_or("-"),
            "client connected"
        );

        Self {
            id,
            label: options.label,
            subscriber: Subscriber::new(id, sender),
            receiver,
            held: Mutex::new(VecDeque::new()),
            registry,
            state: Mutex::new(ConnectionState::Connected),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        !self.state.lock().is_disconnected()
    }

    /// Current memberships (empty once disconnected).
    pub fn topics(&self) -> HashSet<Topic> {
        self.state.lock().topics().cloned().unwrap_or_default()
    }

    /// Join a topic. Returns false if already a member or disconnected.
    pub fn subscribe(&self, topic: impl Into<Topic>) -> bool {
        let topic = topic.into();
        let mut state = self.state.lock();

        if state.is_disconnected() {
            return false;
        }
        if *state == ConnectionState::Connected {
            *state = ConnectionState::Subscribed(HashSet::new());
        }
        let ConnectionState::Subscribed(topics) = &mut *state else {
            return false;
        };

        if !topics.insert(topic.clone()) {
            return false;
        }
        self.registry.subscribe(&self.subscriber, topic.clone());

        tracing::debug!(connection = %self.id, topic = %topic, "subscribed");
        true
    }

    /// Leave a topic. Returns false if not a member or disconnected.
    pub fn unsubscribe(&self, topic: impl Into<Topic>) -> bool {
        let topic = topic.into();
        let mut state = self.state.lock();

        let ConnectionState::Subscribed(topics) = &mut *state else {
            return false;
        };
        if !topics.remove(&topic) {
            return false;
        }
        self.registry.unsubscribe(self.id, &topic);
        if topics.is_empty() {
            *state = ConnectionState::Connected;
        }

        tracing::debug!(connection = %self.id, topic = %topic, "unsubscribed");
        true
    }

    /// Leave every topic and stop accepting pushes.
    ///
    /// Idempotent: only the first call touches the registry. Pushes already
    /// queued stay readable.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        if state.is_disconnected() {
            return;
        }
        *state = ConnectionState::Disconnected;
        let dropped = self.registry.drop_connection(self.id);

        tracing::debug!(connection = %self.id, memberships = dropped, "client disconnected");
    }

    /// Apply one client message.
    pub fn handle(&self, message: ClientMessage) {
        match message {
            ClientMessage::Subscribe { category } => {
                self.subscribe(category);
            }
            ClientMessage::Unsubscribe { category } => {
                self.unsubscribe(category);
            }
            ClientMessage::Disconnect => self.disconnect(),
        }
    }

    /// Decode and apply one JSON client frame.
    ///
    /// A malformed frame changes nothing and is reported as `Protocol`.
    pub fn handle_frame(&self, frame: &str) -> FeedResult<()> {
        let message = ClientMessage::decode(frame).map_err(|e| {
            tracing::warn!(connection = %self.id, error = %e, "rejected client frame");
            e
        })?;
        self.handle(message);
        Ok(())
    }

    // --- Receiving ---

    /// Receive the next push (blocking).
    pub fn recv(&self) -> Result<ServerMessage, RecvError> {
        if let Some(message) = self.held.lock().pop_front() {
            return Ok(message);
        }
        self.receiver.recv()
    }

    /// Try to receive a push (non-blocking).
    pub fn try_recv(&self) -> Result<ServerMessage, TryRecvError> {
        if let Some(message) = self.held.lock().pop_front() {
            return Ok(message);
        }
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ServerMessage, RecvTimeoutError> {
        if let Some(message) = self.held.lock().pop_front() {
            return Ok(message);
        }
        self.receiver.recv_timeout(timeout)
    }

    /// Take every queued push, oldest first.
    pub fn drain(&self) -> Vec<NewsItem> {
        self.take_all().into_iter().map(ServerMessage::into_item).collect()
    }

    /// Take every queued push as encoded JSON frames.
    pub fn drain_frames(&self) -> FeedResult<Vec<String>> {
        self.take_all().iter().map(ServerMessage::encode).collect()
    }

    /// Take the queued pushes whose category falls under `topic`, oldest first.
    ///
    /// Other pushes stay queued, in order, for the next receive.
    pub fn take_matching(&self, topic: &Topic) -> Vec<NewsItem> {
        let mut held = self.held.lock();
        held.extend(self.receiver.try_iter());

        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(held.len());
        for message in held.drain(..) {
            if topic.matches(message.item().category) {
                taken.push(message.into_item());
            } else {
                kept.push_back(message);
            }
        }
        *held = kept;
        taken
    }

    /// Number of pushes waiting.
    pub fn pending(&self) -> usize {
        self.held.lock().len() + self.receiver.len()
    }

    fn take_all(&self) -> Vec<ServerMessage> {
        let mut held = self.held.lock();
        let messages: Vec<ServerMessage> = held.drain(..).chain(self.receiver.try_iter()).collect();
        messages
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &*self.state.lock())
            .finish()
    }
}
