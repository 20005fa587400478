//! Per-connection session data.
//!
//! Every physical connection gets one [`ConnectionHandle`] and exactly one
//! stored session value for its lifetime. The [`SessionStore`] owns the
//! mapping; [`SessionListener`]s are told about creation and removal but never
//! own the data.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::dispatch::DispatchError;

pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "conn-{}", self.0)
    }
}

/// Raw connection handle handed to operations as an ambient argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: String,
    codec: &'static str,
}

impl ConnectionHandle {
    /// Describes a freshly accepted connection.
    pub fn new(peer: impl Into<String>, codec: &'static str) -> Self {
        Self {
            id: ConnectionId::next(),
            peer: peer.into(),
            codec,
        }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer description, such as a socket address.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Name of the codec bound to the connection.
    #[must_use]
    pub fn codec(&self) -> &'static str {
        self.codec
    }
}

/// Observer for session creation and removal.
pub trait SessionListener<S>: Send + Sync {
    /// Called after the session is stored and before any message is dispatched.
    fn session_created(&self, connection: &ConnectionHandle, session: &S);

    /// Called after the session is removed.
    fn session_dropped(&self, connection: &ConnectionHandle, session: &S);
}

/// Concurrent map from connection to session data.
pub struct SessionStore<S> {
    sessions: RwLock<HashMap<ConnectionId, Arc<S>>>,
}

impl<S> Default for SessionStore<S> {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl<S> SessionStore<S> {
    /// Stores a session; returns `false` if the connection already had one.
    pub(crate) fn insert(&self, id: ConnectionId, session: Arc<S>) -> Result<bool, DispatchError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| DispatchError::internal("session store lock poisoned"))?;
        if sessions.contains_key(&id) {
            return Ok(false);
        }
        sessions.insert(id, session);
        Ok(true)
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> Result<Option<Arc<S>>, DispatchError> {
        self.sessions
            .write()
            .map(|mut sessions| sessions.remove(&id))
            .map_err(|_| DispatchError::internal("session store lock poisoned"))
    }

    /// Session stored for a connection.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Internal`] if the store lock is poisoned.
    pub fn get(&self, id: ConnectionId) -> Result<Option<Arc<S>>, DispatchError> {
        self.sessions
            .read()
            .map(|sessions| sessions.get(&id).cloned())
            .map_err(|_| DispatchError::internal("session store lock poisoned"))
    }

    /// Number of live sessions.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Internal`] if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, DispatchError> {
        self.sessions
            .read()
            .map(|sessions| sessions.len())
            .map_err(|_| DispatchError::internal("session store lock poisoned"))
    }
}
