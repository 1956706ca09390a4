//! Registry of live game sessions.
//!
//! Tracks every session that owns a connection and an engine process, counts
//! games started, and closes everything down on process shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use kibitz_domain::SessionId;

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Session {0} is already registered")]
    DuplicateSession(SessionId),
    #[error("Server is shutting down")]
    ShuttingDown,
}

/// A registered session as seen from outside its task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    started_at: DateTime<Utc>,
    /// Cancelled by the registry to ask the session to finish up
    shutdown: CancellationToken,
    /// Cancelled once the session has left the registry
    closed: CancellationToken,
}

impl SessionHandle {
    pub fn new(id: SessionId, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Token the session watches for a shutdown request.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, SessionHandle>,
    started: u64,
    shutting_down: bool,
}

/// Manages all live game sessions.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. The returned lease deregisters it when released
    /// or dropped.
    pub fn register(
        self: &Arc<Self>,
        handle: SessionHandle,
    ) -> Result<SessionLease, RegistryError> {
        let id = handle.id;
        let mut inner = self.inner.lock();
        if inner.shutting_down {
            return Err(RegistryError::ShuttingDown);
        }
        if inner.sessions.contains_key(&id) {
            return Err(RegistryError::DuplicateSession(id));
        }
        inner.sessions.insert(id, handle);
        inner.started += 1;
        tracing::debug!(session_id = %id, live = inner.sessions.len(), "Session registered");

        Ok(SessionLease {
            registry: Arc::clone(self),
            id,
            released: false,
        })
    }

    /// Remove a session. Returns false when it was not registered.
    pub fn deregister(&self, id: SessionId) -> bool {
        let removed = self.inner.lock().sessions.remove(&id);
        match removed {
            Some(handle) => {
                handle.closed.cancel();
                tracing::debug!(session_id = %id, "Session deregistered");
                true
            }
            None => false,
        }
    }

    /// Snapshot of the live sessions.
    pub fn list(&self) -> Vec<SessionHandle> {
        self.inner.lock().sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Games started since the registry was created.
    pub fn count_started(&self) -> u64 {
        self.inner.lock().started
    }

    /// Ask every live session to finish and wait until each has left the
    /// registry. Refuses new registrations from here on.
    pub async fn broadcast_shutdown(&self) {
        let snapshot: Vec<SessionHandle> = {
            let mut inner = self.inner.lock();
            inner.shutting_down = true;
            inner.sessions.values().cloned().collect()
        };

        tracing::info!(sessions = snapshot.len(), "Broadcasting shutdown to live sessions");
        for handle in &snapshot {
            handle.shutdown.cancel();
        }
        for handle in &snapshot {
            handle.closed.cancelled().await;
            tracing::debug!(
                session_id = %handle.id,
                started_at = %handle.started_at,
                "Session acknowledged shutdown"
            );
        }
    }
}

/// Registration guard held by a session task.
pub struct SessionLease {
    registry: Arc<SessionRegistry>,
    id: SessionId,
    released: bool,
}

impl SessionLease {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Deregister now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.deregister(self.id);
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}
