//! # newswire
//!
//! Real-time fan-out of news items to subscribed clients.
//!
//! ## Core Concepts
//!
//! - **Items**: Validated, immutable news items in one of six categories
//! - **Stores**: Durable item storage behind the `ItemStore` trait
//! - **Subscriptions**: Connections join categories (or "all") and receive pushes
//! - **Publishing**: Persist first, then broadcast; a failed write pushes nothing
//!
//! ## Example
//!
//! ```ignore
//! use newswire::{Category, FeedConfig, ItemDraft, NewsFeed};
//!
//! let feed = NewsFeed::open(FeedConfig::default())?;
//!
//! let conn = feed.connect();
//! let view = feed.sync(&conn, [Category::Tech], Category::Tech)?;
//!
//! feed.publish(ItemDraft::new("T1", "C1", "Tech"))?;
//! let pushed = conn.recv()?.into_item();
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod memory;
pub mod publish;
pub mod records;
pub mod store;
pub mod subscriptions;
pub mod sync;
pub mod types;

// Re-exports
pub use config::{FeedConfig, StoreConfig, DEFAULT_CONNECTION_BUFFER};
pub use error::{FeedError, FeedResult, Result, StoreError, ValidationError};
pub use feed::NewsFeed;
pub use memory::MemoryStore;
pub use publish::{PublishCoordinator, Published};
pub use records::{ItemIndex, ItemLog, LogEntry};
pub use store::{FileStore, ItemStore};
pub use subscriptions::{
    BroadcastReport, ClientMessage, ConnectOptions, Connection, ConnectionId, ConnectionState,
    Delivery, NotificationBus, ServerMessage, Subscriber, SubscriptionRegistry,
};
pub use sync::FeedView;
pub use types::*;
