//! Served diagnostics runtime for behaviour tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use courier_config::MapConfigSource;
use courier_wire::CloseStatus;

use crate::bootstrap::{Server, ServerHandle, bootstrap_with};
use crate::diagnostics::{self, DaemonSession};
use crate::session::{ConnectionHandle, SessionListener};
use crate::transport::ConnectionOutcome;

use super::{RecordingHealthReporter, TestConfigLoader};

const OUTCOME_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts session lifecycle notifications.
#[derive(Debug, Default)]
pub struct RecordingSessionListener {
    created: AtomicUsize,
    dropped: AtomicUsize,
    peers: Mutex<Vec<String>>,
}

impl RecordingSessionListener {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers.lock().expect("peers mutex poisoned").clone()
    }
}

impl SessionListener<DaemonSession> for RecordingSessionListener {
    fn session_created(&self, _connection: &ConnectionHandle, session: &DaemonSession) {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.peers
            .lock()
            .expect("peers mutex poisoned")
            .push(session.peer().to_owned());
    }

    fn session_dropped(&self, _connection: &ConnectionHandle, _session: &DaemonSession) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// The diagnostics runtime, served on the loader's socket.
pub struct TestServer {
    pub server: Server<DaemonSession>,
    pub reporter: Arc<RecordingHealthReporter>,
    pub sessions: Arc<RecordingSessionListener>,
    pub loader: TestConfigLoader,
    handle: Option<ServerHandle>,
    outcomes: Receiver<(ConnectionHandle, ConnectionOutcome)>,
}

impl TestServer {
    /// Bootstraps the diagnostics blueprint, capped at five counted items,
    /// and starts serving.
    pub fn start(loader: TestConfigLoader) -> Self {
        let reporter = Arc::new(RecordingHealthReporter::default());
        let sessions = Arc::new(RecordingSessionListener::default());
        let blueprint = diagnostics::blueprint()
            .config_source(Arc::new(
                MapConfigSource::new().with_table("diagnostics", json!({ "max_count": 5 })),
            ))
            .session_listener(Arc::clone(&sessions) as Arc<dyn SessionListener<DaemonSession>>);
        let (sender, outcomes) = mpsc::channel();
        let server = bootstrap_with(&loader, Arc::clone(&reporter) as _, blueprint)
            .expect("bootstrap should succeed")
            .with_connection_observer(move |connection, outcome| {
                let _ = sender.send((connection.clone(), outcome));
            });
        let handle = server.serve().expect("serve should succeed");
        Self {
            server,
            reporter,
            sessions,
            loader,
            handle: Some(handle),
            outcomes,
        }
    }

    /// Bound loopback address.
    pub fn addr(&self) -> SocketAddr {
        self.handle
            .as_ref()
            .and_then(ServerHandle::local_addr)
            .expect("server listens on tcp")
    }

    /// Next connection that completed its handshake.
    pub fn next_connection(&self) -> (ConnectionHandle, ConnectionOutcome) {
        self.outcomes
            .recv_timeout(OUTCOME_TIMEOUT)
            .expect("connection observed")
    }

    /// Waits for the next connection to close and returns its status.
    pub fn next_close_status(&self) -> CloseStatus {
        let (_, outcome) = self.next_connection();
        outcome
            .await_close_timeout(OUTCOME_TIMEOUT)
            .expect("connection closed")
    }

    /// Number of sessions currently stored.
    pub fn live_sessions(&self) -> usize {
        self.server
            .dispatcher()
            .sessions()
            .len()
            .expect("session store")
    }

    /// Stops the accept loop and waits for it.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
            handle.join().expect("listener joins");
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown();
        }
    }
}
