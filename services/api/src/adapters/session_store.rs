//! services/api/src/adapters/session_store.rs
//!
//! An in-memory `SessionStore`. Sessions expire after a period of inactivity.
//! An expired entry is dropped when it is next looked up, and every `create`
//! sweeps out the expired entries nobody came back for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use terminal_pos_core::domain::{SessionId, TerminalSession};
use terminal_pos_core::ports::{PortError, PortResult, SessionStore};

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, TerminalSession>>,
    ttl: chrono::Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    fn is_live(&self, session: &TerminalSession, now: DateTime<Utc>) -> bool {
        now - session.last_accessed_at <= self.ttl
    }

    /// Number of sessions currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Looks up a live session, dropping it if it has expired.
    async fn live<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut TerminalSession) -> R,
    ) -> Option<R> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let expired = match sessions.get_mut(id) {
            Some(session) if self.is_live(session, now) => {
                session.last_accessed_at = now;
                return Some(f(session));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!("Session {} expired", id);
            sessions.remove(id);
        }
        None
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> PortResult<TerminalSession> {
        let now = Utc::now();
        let session = TerminalSession {
            id: SessionId::generate(),
            selected_reader_id: None,
            created_at: now,
            last_accessed_at: now,
        };
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| self.is_live(s, now));
        let reaped = before - sessions.len();
        if reaped > 0 {
            debug!("Reaped {} expired sessions", reaped);
        }
        sessions.insert(session.id.clone(), session.clone());
        debug!("Session {} created", session.id);
        Ok(session)
    }

    async fn touch(&self, id: &SessionId) -> PortResult<bool> {
        Ok(self.live(id, |_| ()).await.is_some())
    }

    async fn selected_reader(&self, id: &SessionId) -> PortResult<Option<String>> {
        Ok(self
            .live(id, |s| s.selected_reader_id.clone())
            .await
            .flatten())
    }

    async fn set_selected_reader(
        &self,
        id: &SessionId,
        reader_id: Option<&str>,
    ) -> PortResult<()> {
        self.live(id, |s| s.selected_reader_id = reader_id.map(str::to_string))
            .await
            .ok_or_else(|| PortError::NotFound(format!("Session {id} not found")))
    }
}
