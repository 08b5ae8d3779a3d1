//! Per-connection relay sessions.
//!
//! [`SessionRegistry`] holds at most one [`RelaySession`] per connection and
//! refuses to start a new turn while the current one is pending or streaming.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::provider::ProviderKind;

/// Identifier of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of one turn: `Pending -> Streaming -> {Done | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Streaming,
    Done,
    Failed,
}

impl SessionStatus {
    /// Pending or streaming; blocks new turns on the connection.
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::Streaming)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Streaming) | (Pending, Failed) | (Streaming, Done) | (Streaming, Failed)
        )
    }
}

/// Transient state of one in-flight turn.
#[derive(Debug)]
pub struct RelaySession {
    pub connection_id: ConnectionId,
    pub turn_id: Uuid,
    pub provider: ProviderKind,
    pub status: SessionStatus,
    pub error_detail: Option<String>,
    pub started_at: DateTime<Utc>,
    task: Option<AbortHandle>,
}

impl RelaySession {
    fn new(connection_id: ConnectionId, provider: ProviderKind) -> Self {
        Self {
            connection_id,
            turn_id: Uuid::new_v4(),
            provider,
            status: SessionStatus::Pending,
            error_detail: None,
            started_at: Utc::now(),
            task: None,
        }
    }

    /// Apply a state transition. Illegal transitions leave the session unchanged.
    pub fn transition(&mut self, next: SessionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                connection_id = %self.connection_id,
                turn_id = %self.turn_id,
                from = ?self.status,
                to = ?next,
                "Ignoring illegal session transition"
            );
            return false;
        }
        self.status = next;
        true
    }
}

/// Sessions keyed by connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, RelaySession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending session for a new turn and return its turn id.
    ///
    /// Fails with [`Error::ConcurrentRequest`] if the connection already has
    /// an active session. A leftover terminal session is replaced.
    pub fn try_begin(&self, connection_id: ConnectionId, provider: ProviderKind) -> Result<Uuid> {
        match self.sessions.entry(connection_id) {
            Entry::Occupied(entry) if entry.get().status.is_active() => {
                Err(Error::ConcurrentRequest)
            }
            Entry::Occupied(mut entry) => {
                let session = RelaySession::new(connection_id, provider);
                let turn_id = session.turn_id;
                entry.insert(session);
                Ok(turn_id)
            }
            Entry::Vacant(entry) => {
                let session = RelaySession::new(connection_id, provider);
                let turn_id = session.turn_id;
                entry.insert(session);
                Ok(turn_id)
            }
        }
    }

    /// Remember the task driving a turn so a disconnect can abort it.
    pub fn attach_task(&self, connection_id: ConnectionId, turn_id: Uuid, task: AbortHandle) {
        if let Some(mut session) = self.sessions.get_mut(&connection_id) {
            if session.turn_id == turn_id {
                session.task = Some(task);
            }
        }
    }

    /// Transition the turn's session. Returns false if the turn is gone
    /// (abandoned or superseded) or the transition is illegal.
    pub fn transition(&self, connection_id: ConnectionId, turn_id: Uuid, next: SessionStatus) -> bool {
        match self.sessions.get_mut(&connection_id) {
            Some(mut session) if session.turn_id == turn_id => session.transition(next),
            _ => false,
        }
    }

    /// Mark the turn failed and record why.
    pub fn fail(&self, connection_id: ConnectionId, turn_id: Uuid, detail: String) -> bool {
        match self.sessions.get_mut(&connection_id) {
            Some(mut session) if session.turn_id == turn_id => {
                let moved = session.transition(SessionStatus::Failed);
                if moved {
                    session.error_detail = Some(detail);
                }
                moved
            }
            _ => false,
        }
    }

    /// Whether `turn_id` is still the connection's session.
    pub fn is_current(&self, connection_id: ConnectionId, turn_id: Uuid) -> bool {
        self.sessions
            .get(&connection_id)
            .is_some_and(|s| s.turn_id == turn_id)
    }

    /// Drop the turn's session once its terminal event is out.
    pub fn finish(&self, connection_id: ConnectionId, turn_id: Uuid) -> Option<RelaySession> {
        self.sessions
            .remove_if(&connection_id, |_, s| s.turn_id == turn_id)
            .map(|(_, s)| s)
    }

    /// Remove the connection's session and abort its task, if any.
    pub fn abandon(&self, connection_id: ConnectionId) -> Option<RelaySession> {
        let (_, session) = self.sessions.remove(&connection_id)?;
        if let Some(task) = &session.task {
            task.abort();
        }
        Some(session)
    }

    pub fn status(&self, connection_id: ConnectionId) -> Option<SessionStatus> {
        self.sessions.get(&connection_id).map(|s| s.status)
    }

    /// Number of sessions currently pending or streaming.
    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.status.is_active()).count()
    }
}
