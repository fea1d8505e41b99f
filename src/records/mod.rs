//! Item log implementation.
//!
//! Items are stored in an append-only log; deletes append tombstones.
//! An in-memory index maps ids and categories to log offsets.

mod index;
mod log;

pub use index::ItemIndex;
pub use log::{EntryIterator, ItemLog, LogEntry};
