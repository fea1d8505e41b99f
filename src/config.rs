//! Configuration for the item store and the feed.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory for the store.
    pub path: PathBuf,

    /// Item cache size (number of items).
    pub item_cache_size: usize,

    /// Sync the log to disk every N writes (1 = every write).
    pub sync_every: u64,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./newswire"),
            item_cache_size: 1000,
            sync_every: 1,
            create_if_missing: true,
        }
    }
}

/// Default outbound buffer per connection (pushes).
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub store: StoreConfig,

    /// Max pushes queued per connection before further pushes are dropped.
    pub connection_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
        }
    }
}

impl FeedConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}
