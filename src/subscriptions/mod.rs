//! Live delivery of new items to subscribed connections.
//!
//! - `SubscriptionRegistry`: topic -> member connections, behind one lock
//! - `NotificationBus`: fans a stored item out to its category and "all"
//! - `Connection`: per-client state machine owning its memberships and outbox
//!
//! Delivery is best-effort and at-most-once. Each connection has a bounded
//! outbox; a full outbox loses pushes for that connection only.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(SubscriptionRegistry::new());
//! let bus = NotificationBus::new(Arc::clone(&registry));
//!
//! let conn = Connection::open(Arc::clone(&registry), ConnectOptions::default());
//! conn.subscribe(Category::Tech);
//!
//! bus.broadcast(&item);
//! let pushed = conn.recv()?;
//! ```

mod bus;
mod connection;
mod registry;
mod types;

pub use bus::NotificationBus;
pub use connection::Connection;
pub use registry::{Delivery, Subscriber, SubscriptionRegistry};
pub use types::{
    BroadcastReport, ClientMessage, ConnectOptions, ConnectionId, ConnectionState, ServerMessage,
};
