//! Error types for the item store and the feed.

use crate::subscriptions::ConnectionId;
use crate::types::ItemId;
use thiserror::Error;

/// Error type for item store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Store unavailable")]
    Unavailable,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A publish candidate that breaks one of the item rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("content must not be empty")]
    EmptyContent,

    #[error("unknown category: {0:?}")]
    UnknownCategory(String),
}

/// Error type for feed operations (publish, lookup, protocol handling).
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Malformed frame: {0}")]
    Protocol(String),

    #[error("Connection closed: {0}")]
    Disconnected(ConnectionId),
}

impl FeedError {
    pub fn is_validation(&self) -> bool {
        matches!(self, FeedError::Validation(_))
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, FeedError::Persistence(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FeedError::NotFound(_))
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, FeedError::Disconnected(_))
    }
}

/// Result type for feed operations.
pub type FeedResult<T> = std::result::Result<T, FeedError>;
