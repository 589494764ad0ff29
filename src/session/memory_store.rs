use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{SessionKey, SessionRecord, SessionStore};
use crate::errors::SessionError;

/// Ephemeral session store; state lives for the process only.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<SessionKey, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.records
            .lock()
            .await
            .keys()
            .any(|k| k.session_id == session_id)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn ensure(&self, key: &SessionKey) -> Result<bool, SessionError> {
        let mut records = self.records.lock().await;
        if records.contains_key(key) {
            return Ok(true);
        }
        records.insert(key.clone(), SessionRecord::new(key.clone()));
        Ok(false)
    }

    async fn append(
        &self,
        key: &SessionKey,
        entry: serde_json::Value,
    ) -> Result<(), SessionError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(key)
            .ok_or_else(|| SessionError::UnknownSession(key.session_id.clone()))?;
        record.history.push(entry);
        Ok(())
    }

    async fn history(&self, key: &SessionKey) -> Result<Vec<serde_json::Value>, SessionError> {
        let records = self.records.lock().await;
        records
            .get(key)
            .map(|r| r.history.clone())
            .ok_or_else(|| SessionError::UnknownSession(key.session_id.clone()))
    }

    async fn purge(&self, session_id: &str) -> Result<(), SessionError> {
        self.records
            .lock()
            .await
            .retain(|k, _| k.session_id != session_id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.records.lock().await.clear();
        Ok(())
    }
}
