use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{SessionKey, SessionRecord, SessionStore};
use crate::errors::SessionError;

/// Current on-disk format version.
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    sessions: Vec<SessionRecord>,
}

/// Session store persisted as one JSON file.
///
/// Every operation reads, modifies and rewrites the file under a lock, so
/// concurrent callers in one process see a consistent view. The file is
/// removed once the last session in it is purged.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn load(&self) -> Result<StoreFile, SessionError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreFile {
                    version: STORE_VERSION,
                    sessions: Vec::new(),
                });
            }
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&content).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn remove_file(&self) -> Result<(), SessionError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    async fn save(&self, file: &StoreFile) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string_pretty(file).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| self.io_err(e))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn ensure(&self, key: &SessionKey) -> Result<bool, SessionError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        if file.sessions.iter().any(|r| &r.key == key) {
            return Ok(true);
        }
        file.sessions.push(SessionRecord::new(key.clone()));
        self.save(&file).await?;
        Ok(false)
    }

    async fn append(
        &self,
        key: &SessionKey,
        entry: serde_json::Value,
    ) -> Result<(), SessionError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let record = file
            .sessions
            .iter_mut()
            .find(|r| &r.key == key)
            .ok_or_else(|| SessionError::UnknownSession(key.session_id.clone()))?;
        record.history.push(entry);
        self.save(&file).await
    }

    async fn history(&self, key: &SessionKey) -> Result<Vec<serde_json::Value>, SessionError> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        file.sessions
            .into_iter()
            .find(|r| &r.key == key)
            .map(|r| r.history)
            .ok_or_else(|| SessionError::UnknownSession(key.session_id.clone()))
    }

    async fn purge(&self, session_id: &str) -> Result<(), SessionError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let before = file.sessions.len();
        file.sessions.retain(|r| r.key.session_id != session_id);
        if file.sessions.is_empty() {
            self.remove_file().await
        } else if file.sessions.len() != before {
            self.save(&file).await
        } else {
            Ok(())
        }
    }

    async fn clear(&self) -> Result<(), SessionError> {
        let _guard = self.lock.lock().await;
        self.remove_file().await
    }
}
