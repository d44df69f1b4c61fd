//! In-memory session storage.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use async_trait::async_trait;

use super::{SessionStorage, StorageError};
use crate::session::Session;

/// In-memory storage implementation.
///
/// Useful for development and tests. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored copy of a record.
    #[must_use]
    pub fn stored(&self, id: &str) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        Ok(())
    }
}
