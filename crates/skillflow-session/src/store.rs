//! Session store: records, pending responses, persistence and eviction.
//!
//! Records live in memory behind a synchronous lock that is never held
//! across an await. Every mutation rewrites the full record through the
//! storage backend; write failures are logged and otherwise ignored.
//!
//! Each record has a recurring inactivity check. An inactive record is
//! evicted from memory and its pending wait rejected, but the stored copy is
//! kept: eviction is not deletion.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    mailbox::{Mailbox, ResponseWaiter},
    session::{Session, SessionError, SessionMeta, SessionStatus, WaitError},
    storage::SessionStorage,
};

struct Entry {
    session: Session,
    mailbox: Mailbox,
}

struct StoreInner {
    entries: Mutex<HashMap<String, Entry>>,
    storage: Arc<dyn SessionStorage>,
    /// Orders writes so the last write carries the latest state.
    write_lock: tokio::sync::Mutex<()>,
    inactivity_timeout: Duration,
}

impl StoreInner {
    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> R) -> R {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries)
    }

    /// Evict `id` if it has been inactive for the timeout.
    ///
    /// Returns `false` once the record is gone and checking can stop.
    fn check_inactive(&self, id: &str) -> bool {
        self.with_entries(|entries| {
            let Some(entry) = entries.get(id) else {
                return false;
            };
            let idle = Utc::now()
                .signed_duration_since(entry.session.last_activity)
                .to_std()
                .unwrap_or_default();
            if idle < self.inactivity_timeout {
                return true;
            }
            if let Some(mut entry) = entries.remove(id) {
                entry.mailbox.reject(WaitError::TimedOut);
            }
            tracing::info!(session = id, idle_secs = idle.as_secs(), "Evicted inactive session");
            false
        })
    }
}

/// Shared handle to the session store.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    /// Open the store, loading every readable stored record.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn open(storage: Arc<dyn SessionStorage>, inactivity_timeout: Duration) -> Self {
        let loaded = match storage.load_all().await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!("Failed to load sessions: {e}");
                Vec::new()
            }
        };

        let store = Self {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(HashMap::new()),
                storage,
                write_lock: tokio::sync::Mutex::new(()),
                inactivity_timeout,
            }),
        };

        let ids: Vec<String> = loaded.iter().map(|s| s.id.clone()).collect();
        store.inner.with_entries(|entries| {
            for session in loaded {
                entries.insert(
                    session.id.clone(),
                    Entry {
                        session,
                        mailbox: Mailbox::default(),
                    },
                );
            }
        });
        tracing::info!("Loaded {} sessions", ids.len());
        for id in ids {
            store.arm_inactivity_check(id);
        }
        store
    }

    /// Create an active session and persist it.
    pub async fn create(&self, skill_name: &str) -> Session {
        let session = Session::new(Uuid::new_v4().to_string(), skill_name.to_string());
        self.inner.with_entries(|entries| {
            entries.insert(
                session.id.clone(),
                Entry {
                    session: session.clone(),
                    mailbox: Mailbox::default(),
                },
            );
        });
        tracing::info!(session = %session.id, skill = skill_name, "Created session");
        self.persist(&session.id).await;
        self.arm_inactivity_check(session.id.clone());
        session
    }

    /// Get a session. A read counts as activity.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.inner.with_entries(|entries| {
            entries.get_mut(id).map(|entry| {
                entry.session.touch();
                entry.session.clone()
            })
        })
    }

    /// All in-memory sessions, most recently active first.
    ///
    /// With a plugin filter, only sessions of that plugin or of no plugin.
    #[must_use]
    pub fn list(&self, plugin_id: Option<&str>) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.inner.with_entries(|entries| {
            entries
                .values()
                .map(|entry| &entry.session)
                .filter(|s| match (plugin_id, s.plugin_id.as_deref()) {
                    (Some(filter), Some(owner)) => filter == owner,
                    _ => true,
                })
                .cloned()
                .collect()
        });
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        sessions
    }

    /// Update metadata fields and refresh activity.
    ///
    /// # Errors
    /// Returns error if the session is not in memory.
    pub async fn update_meta(&self, id: &str, meta: SessionMeta) -> Result<(), SessionError> {
        self.mutate(id, |session| {
            meta.apply(session);
            session.touch();
        })
        .await
    }

    /// Record the runtime session id used to resume.
    ///
    /// # Errors
    /// Returns error if the session is not in memory.
    pub async fn update_sdk_session_id(
        &self,
        id: &str,
        sdk_session_id: &str,
    ) -> Result<(), SessionError> {
        self.mutate(id, |session| {
            session.sdk_session_id = Some(sdk_session_id.to_string());
        })
        .await
    }

    /// Set the status and refresh activity.
    ///
    /// # Errors
    /// Returns error if the session is not in memory.
    pub async fn set_status(&self, id: &str, status: SessionStatus) -> Result<(), SessionError> {
        self.mutate(id, |session| {
            session.status = status;
            session.touch();
        })
        .await
    }

    /// Mark the session waiting and register a wait for the user's response.
    ///
    /// A second call before resolution replaces the slot; the earlier waiter
    /// receives [`WaitError::Superseded`].
    ///
    /// # Errors
    /// Returns error if the session is not in memory.
    pub async fn wait_for_user_response(&self, id: &str) -> Result<ResponseWaiter, SessionError> {
        let waiter = self.inner.with_entries(|entries| {
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            entry.session.status = SessionStatus::Waiting;
            entry.session.touch();
            Ok(entry.mailbox.open())
        })?;
        self.persist(id).await;
        Ok(waiter)
    }

    /// Deliver the user's response to the pending wait.
    ///
    /// Returns `false` if nothing was pending.
    pub async fn resolve_user_response(&self, id: &str, response: &str) -> bool {
        let resolved = self.inner.with_entries(|entries| {
            let Some(entry) = entries.get_mut(id) else {
                return false;
            };
            if !entry.mailbox.deliver(response.to_string()) {
                return false;
            }
            entry.session.status = SessionStatus::Active;
            entry.session.touch();
            true
        });
        if resolved {
            self.persist(id).await;
        }
        resolved
    }

    /// Whether a live wait is registered for the session.
    #[must_use]
    pub fn has_pending_response(&self, id: &str) -> bool {
        self.inner
            .with_entries(|entries| entries.get(id).is_some_and(|e| e.mailbox.is_pending()))
    }

    /// Delete a session from memory and storage.
    ///
    /// Any pending wait is rejected with [`WaitError::Deleted`] before the
    /// record is removed. Returns `false` if the session was not in memory.
    pub async fn delete(&self, id: &str) -> bool {
        let Some(mut entry) = self.inner.with_entries(|entries| entries.remove(id)) else {
            return false;
        };
        entry.mailbox.reject(WaitError::Deleted);

        let _guard = self.inner.write_lock.lock().await;
        if let Err(e) = self.inner.storage.remove(id).await {
            tracing::error!(session = id, "Failed to remove session record: {e}");
        }
        tracing::info!(session = id, "Deleted session");
        true
    }

    async fn mutate(&self, id: &str, f: impl FnOnce(&mut Session)) -> Result<(), SessionError> {
        self.inner.with_entries(|entries| {
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
            f(&mut entry.session);
            Ok(())
        })?;
        self.persist(id).await;
        Ok(())
    }

    /// Write the current in-memory state of `id`.
    ///
    /// The snapshot is taken after acquiring the write lock, so concurrent
    /// mutations of the same id end with the newest state on disk.
    async fn persist(&self, id: &str) {
        let _guard = self.inner.write_lock.lock().await;
        let Some(snapshot) = self
            .inner
            .with_entries(|entries| entries.get(id).map(|e| e.session.clone()))
        else {
            return;
        };
        if let Err(e) = self.inner.storage.save(&snapshot).await {
            tracing::error!(session = id, "Failed to save session: {e}");
        }
    }

    fn arm_inactivity_check(&self, id: String) {
        let inner: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let period = self.inner.inactivity_timeout;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                if !inner.check_inactive(&id) {
                    return;
                }
            }
        });
    }
}
