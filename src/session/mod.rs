//! Session state for the reasoning backend.
//!
//! A session is identified by `(scope, user_id, session_id)` and is created
//! lazily the first time [`SessionStore::ensure`] sees it. Two lifetimes are
//! used by the pipeline:
//!
//! - per-artifact sessions: fresh identity per artifact, purged after use
//! - per-run sessions: identity derived from the pull request, purged when
//!   the run ends
//!
//! The store only keeps records and an append-only event history. Cross
//! artifact aggregation lives in [`crate::memory`], never in session history.

pub mod file_store;
pub mod memory_store;

pub use file_store::FileSessionStore;
pub use memory_store::InMemorySessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::errors::SessionError;

/// Scope name used for every session this crate creates.
pub const APP_SCOPE: &str = "perflens";

/// User id used for sessions driven by the CLI.
pub const DEFAULT_USER: &str = "perflens-cli";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub scope: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        scope: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// A new per-artifact key with a random session id.
    pub fn fresh() -> Self {
        Self::new(
            APP_SCOPE,
            DEFAULT_USER,
            format!("artifact-{}", Uuid::new_v4().simple()),
        )
    }

    /// Key for the run-level session of a pull request.
    pub fn for_run(host: &str, repository: &str, number: u64) -> Self {
        Self::new(
            APP_SCOPE,
            DEFAULT_USER,
            derive_run_session_id(host, repository, number),
        )
    }
}

/// A session as seen by a stage executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub key: SessionKey,
    /// Whether the session existed before the current stage ran, i.e.
    /// whether the backend has history to resume.
    pub existed: bool,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.key.session_id
    }

    /// Backend conversation id for this session.
    pub fn backend_uuid(&self) -> Uuid {
        session_uuid(&self.key.session_id)
    }
}

/// Stored session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub key: SessionKey,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
}

impl SessionRecord {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            created_at: Utc::now(),
            history: Vec::new(),
        }
    }
}

/// Backing store for session records.
///
/// Implementations must keep records for different session ids independent
/// under concurrent calls, and `ensure` must be idempotent for one key.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the record if absent. Returns `true` when it already existed.
    async fn ensure(&self, key: &SessionKey) -> Result<bool, SessionError>;

    /// Append one entry to a session's history.
    async fn append(&self, key: &SessionKey, entry: serde_json::Value)
    -> Result<(), SessionError>;

    async fn history(&self, key: &SessionKey) -> Result<Vec<serde_json::Value>, SessionError>;

    /// Remove every record carrying `session_id`.
    async fn purge(&self, session_id: &str) -> Result<(), SessionError>;

    /// Drop all backing state, including any file on disk.
    async fn clear(&self) -> Result<(), SessionError>;
}

/// Purge a session, logging instead of failing.
pub async fn purge_quietly(store: &dyn SessionStore, session_id: &str) {
    if let Err(e) = store.purge(session_id).await {
        tracing::warn!(session_id, error = %e, "Failed to purge session");
    }
}

/// Deterministic run session id: `pr-` followed by 16 hex chars of
/// SHA-256 over the host, repository and number.
pub fn derive_run_session_id(host: &str, repository: &str, number: u64) -> String {
    let digest = Sha256::digest(format!("{}/{}#{}", host, repository, number).as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("pr-{}", hex)
}

/// Map an arbitrary session id onto a stable UUID for the backend CLI.
pub fn session_uuid(session_id: &str) -> Uuid {
    let digest = Sha256::digest(session_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}
