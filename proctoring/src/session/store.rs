//! Session store contract and in-memory implementation
//!
//! The durable exam session and its warnings belong to an external
//! collaborator. The escalation engine only ever touches them through
//! [`SessionStore`]. [`InMemorySessionStore`] is the implementation used by
//! the bundled server and by tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::SessionId;
use crate::escalation::{ExamSession, SessionStatus, WarningRecord};

/// Error type for session store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session {id} is {status}, not active")]
    NotActive { id: SessionId, status: SessionStatus },

    #[error("Session already exists: {0}")]
    AlreadyExists(SessionId),

    /// Failure reported by an external store backend
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result type for session store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// What the escalation engine needs to know about a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub warnings_count: u32,
}

impl From<&ExamSession> for SessionSnapshot {
    fn from(session: &ExamSession) -> Self {
        Self {
            status: session.status,
            warnings_count: session.warnings_count,
        }
    }
}

/// Session lookup/update contract consumed by the escalation engine
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current status and warning count, or `None` if the session is unknown
    async fn get(&self, id: SessionId) -> StoreResult<Option<SessionSnapshot>>;

    /// Append a warning record and increment `warnings_count` as one unit.
    ///
    /// Returns the new `warnings_count`. Fails with `NotActive` for ended
    /// sessions.
    async fn append_warning(
        &self,
        id: SessionId,
        message: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<u32>;

    /// Active → Terminated, setting `cheating_flag` and `end_time`
    async fn terminate(&self, id: SessionId, ended_at: DateTime<Utc>) -> StoreResult<()>;

    /// Active → Completed, setting `end_time`
    async fn complete(&self, id: SessionId, ended_at: DateTime<Utc>) -> StoreResult<()>;
}

/// Shared reference to a session store
pub type SharedSessionStore = Arc<dyn SessionStore>;

#[derive(Debug, Default)]
struct StoreInner {
    sessions: HashMap<SessionId, ExamSession>,
    warnings: HashMap<SessionId, Vec<WarningRecord>>,
}

impl StoreInner {
    fn active_mut(&mut self, id: SessionId) -> StoreResult<&mut ExamSession> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        if !session.status.is_active() {
            return Err(StoreError::NotActive {
                id,
                status: session.status,
            });
        }
        Ok(session)
    }

    fn finish(
        &mut self,
        id: SessionId,
        next: SessionStatus,
        ended_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let session = self.active_mut(id)?;
        debug_assert!(session.status.can_transition_to(next));
        session.status = next;
        session.end_time = Some(ended_at);
        if next == SessionStatus::Terminated {
            session.cheating_flag = true;
        }
        Ok(())
    }
}

/// Process-memory session store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: RwLock<StoreInner>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in an `Arc`
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Start a new active session
    pub async fn open_session(&self, id: SessionId) -> StoreResult<ExamSession> {
        self.open_session_at(id, Utc::now()).await
    }

    /// Start a new active session with an explicit start time
    pub async fn open_session_at(
        &self,
        id: SessionId,
        start_time: DateTime<Utc>,
    ) -> StoreResult<ExamSession> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        let session = ExamSession::start(id, start_time);
        inner.sessions.insert(id, session.clone());
        debug!(session_id = %id, "Session opened");
        Ok(session)
    }

    /// Return the existing session, or open it if unknown
    pub async fn ensure_session(&self, id: SessionId) -> ExamSession {
        let mut inner = self.inner.write().await;
        inner
            .sessions
            .entry(id)
            .or_insert_with(|| ExamSession::start(id, Utc::now()))
            .clone()
    }

    /// Full session record
    pub async fn session(&self, id: SessionId) -> Option<ExamSession> {
        self.inner.read().await.sessions.get(&id).cloned()
    }

    /// Warning records for a session, oldest first
    pub async fn warnings(&self, id: SessionId) -> Vec<WarningRecord> {
        self.inner
            .read()
            .await
            .warnings
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of known sessions
    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: SessionId) -> StoreResult<Option<SessionSnapshot>> {
        Ok(self
            .inner
            .read()
            .await
            .sessions
            .get(&id)
            .map(SessionSnapshot::from))
    }

    async fn append_warning(
        &self,
        id: SessionId,
        message: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let mut inner = self.inner.write().await;
        let session = inner.active_mut(id)?;
        session.warnings_count += 1;
        let count = session.warnings_count;

        inner.warnings.entry(id).or_default().push(WarningRecord {
            session_id: id,
            message: message.to_string(),
            timestamp: at,
        });
        Ok(count)
    }

    async fn terminate(&self, id: SessionId, ended_at: DateTime<Utc>) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .finish(id, SessionStatus::Terminated, ended_at)
    }

    async fn complete(&self, id: SessionId, ended_at: DateTime<Utc>) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .finish(id, SessionStatus::Completed, ended_at)
    }
}
