//! In-flight executions keyed by session.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellation handle of one execution.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub id: Uuid,
    pub cancel: CancellationToken,
}

/// At most one live execution per session.
#[derive(Debug, Default)]
pub struct ActiveExecutions {
    inner: Mutex<HashMap<String, ExecutionHandle>>,
}

impl ActiveExecutions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new execution for `session_id`, cancelling any previous one.
    pub fn begin(&self, session_id: &str) -> ExecutionHandle {
        let handle = ExecutionHandle {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        };
        let previous = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), handle.clone());
        if let Some(previous) = previous {
            tracing::info!(session = session_id, "Cancelling previous execution");
            previous.cancel.cancel();
        }
        handle
    }

    /// Cancel the live execution of `session_id`.
    pub fn cancel(&self, session_id: &str) -> bool {
        let handle = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        handle.is_some_and(|handle| {
            handle.cancel.cancel();
            true
        })
    }

    /// Forget an execution, unless a newer one has replaced it.
    pub fn finish(&self, session_id: &str, id: Uuid) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.get(session_id).is_some_and(|h| h.id == id) {
            inner.remove(session_id);
        }
    }

    #[must_use]
    pub fn is_active(&self, session_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }
}
