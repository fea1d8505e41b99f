//! Connection and wire types for live item delivery.

use crate::config::DEFAULT_CONNECTION_BUFFER;
use crate::error::{FeedError, FeedResult};
use crate::types::{NewsItem, Topic};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Unique identifier for a live connection.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Options supplied when a client connects.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// Client-supplied display name, kept for logging only.
    pub label: Option<String>,

    /// Max queued pushes before further pushes to this connection are dropped.
    pub buffer_size: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            label: None,
            buffer_size: DEFAULT_CONNECTION_BUFFER,
        }
    }
}

impl ConnectOptions {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }
}

/// Lifecycle of a connection.
///
/// `Connected` has no memberships, `Subscribed` has at least one.
/// `Disconnected` is terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Subscribed(HashSet<Topic>),
    Disconnected,
}

impl ConnectionState {
    pub fn topics(&self) -> Option<&HashSet<Topic>> {
        match self {
            ConnectionState::Subscribed(topics) => Some(topics),
            _ => None,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }
}

/// Frames sent by a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { category: Topic },
    Unsubscribe { category: Topic },
    Disconnect,
}

impl ClientMessage {
    /// Decode a JSON frame.
    pub fn decode(frame: &str) -> FeedResult<Self> {
        serde_json::from_str(frame).map_err(|e| FeedError::Protocol(e.to_string()))
    }

    pub fn encode(&self) -> FeedResult<String> {
        serde_json::to_string(self).map_err(|e| FeedError::Protocol(e.to_string()))
    }
}

/// Frames pushed to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A newly created item in a subscribed category.
    NewItem { item: NewsItem },
}

impl ServerMessage {
    pub fn item(&self) -> &NewsItem {
        match self {
            ServerMessage::NewItem { item } => item,
        }
    }

    pub fn into_item(self) -> NewsItem {
        match self {
            ServerMessage::NewItem { item } => item,
        }
    }

    pub fn encode(&self) -> FeedResult<String> {
        serde_json::to_string(self).map_err(|e| FeedError::Protocol(e.to_string()))
    }

    pub fn decode(frame: &str) -> FeedResult<Self> {
        serde_json::from_str(frame).map_err(|e| FeedError::Protocol(e.to_string()))
    }
}

/// Counts from one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the item was queued for.
    pub delivered: usize,
    /// Connections whose outbox was full.
    pub dropped_full: usize,
    /// Connections that had already gone away.
    pub dropped_disconnected: usize,
}

impl BroadcastReport {
    pub fn matched(&self) -> usize {
        self.delivered + self.dropped_full + self.dropped_disconnected
    }
}
