//! Storage implementations.

#[cfg(feature = "file")]
pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::Session;

#[cfg(feature = "file")]
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid session id: {0}")]
    InvalidId(String),
}

/// Durable backing for session records.
///
/// Every save writes the whole record.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Load every readable record. Unreadable records are skipped.
    async fn load_all(&self) -> Result<Vec<Session>, StorageError>;

    /// Write a record, replacing any previous version.
    async fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Remove a record. Removing an absent record is not an error.
    async fn remove(&self, id: &str) -> Result<(), StorageError>;
}
