//! One JSON file per session.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{SessionStorage, StorageError};
use crate::session::Session;

/// Stores each record as `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a record.
    ///
    /// # Errors
    /// Returns error if `id` could escape the session directory.
    pub fn path(&self, id: &str) -> Result<PathBuf, StorageError> {
        if id.is_empty() || id.contains(&['/', '\\'][..]) || id.starts_with('.') {
            return Err(StorageError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read_record(path: &Path) -> Result<Session, StorageError> {
        let raw = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl SessionStorage for FileStorage {
    async fn load_all(&self) -> Result<Vec<Session>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable session record: {e}");
                }
            }
        }
        Ok(sessions)
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        let path = self.path(&session.id)?;
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Readers never observe a partially written record.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path(id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("sessions"));

        let mut session = Session::new("abc".into(), "deploy".into());
        session.sdk_session_id = Some("sdk-1".into());
        storage.save(&session).await.unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded, vec![session]);

        storage.remove("abc").await.unwrap();
        storage.remove("abc").await.unwrap();
        assert!(storage.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage
            .save(&Session::new("good".into(), "deploy".into()))
            .await
            .unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "good");
    }

    #[tokio::test]
    async fn test_missing_dir_and_invalid_id() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent"));
        assert!(storage.load_all().await.unwrap().is_empty());
        assert!(matches!(
            storage.remove("../escape").await,
            Err(StorageError::InvalidId(_))
        ));
    }
}
