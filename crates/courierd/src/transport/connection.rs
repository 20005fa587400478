//! Per-connection session management over the framed transport.
//!
//! A connection opens with a handshake: the client sends its endpoint path as
//! a text frame and the server answers with the media type of the codec
//! bound to that path, or closes with `NOT_FOUND`. After the handshake the
//! connection owns one session and a keep-alive probe thread, and inbound
//! frames are dispatched strictly one at a time.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use courier_wire::{CloseStatus, Codec, Frame};

use crate::dispatch::{DispatchError, Dispatcher, ReturnChannel, SessionGuard};
use crate::session::{ConnectionHandle, ConnectionId};

use super::endpoint::EndpointTable;
use super::frame::{WireFrame, read_frame, write_frame};
use super::{ConnectionHandler, ConnectionStream, FrameError, LISTENER_TARGET};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback told about every connection that completes its handshake.
pub type ConnectionObserver = Arc<dyn Fn(&ConnectionHandle, ConnectionOutcome) + Send + Sync>;

/// Close status of a connection, available once it has terminated.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOutcome {
    state: Arc<(Mutex<Option<CloseStatus>>, Condvar)>,
}

impl ConnectionOutcome {
    pub(crate) fn record(&self, status: CloseStatus) {
        let (lock, closed) = &*self.state;
        let mut recorded = lock.lock().unwrap_or_else(PoisonError::into_inner);
        recorded.get_or_insert(status);
        closed.notify_all();
    }

    /// Close status if the connection has already terminated.
    #[must_use]
    pub fn close_status(&self) -> Option<CloseStatus> {
        let (lock, _) = &*self.state;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the connection terminates.
    #[must_use]
    pub fn await_close(&self) -> CloseStatus {
        let (lock, closed) = &*self.state;
        let recorded = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let recorded = closed
            .wait_while(recorded, |status| status.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        recorded.unwrap_or(CloseStatus::ABNORMAL)
    }

    /// Like [`Self::await_close`], giving up after `timeout`.
    #[must_use]
    pub fn await_close_timeout(&self, timeout: Duration) -> Option<CloseStatus> {
        let (lock, closed) = &*self.state;
        let recorded = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (recorded, _) = closed
            .wait_timeout_while(recorded, timeout, |status| status.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        *recorded
    }
}

/// Serves handshaken connections through a [`Dispatcher`].
pub struct DispatchConnectionHandler<S> {
    dispatcher: Arc<Dispatcher<S>>,
    endpoints: EndpointTable,
    keep_alive: Duration,
    observer: Option<ConnectionObserver>,
}

impl<S: Send + Sync + 'static> DispatchConnectionHandler<S> {
    /// Creates a handler probing idle connections every `keep_alive`.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher<S>>, endpoints: EndpointTable, keep_alive: Duration) -> Self {
        Self {
            dispatcher,
            endpoints,
            keep_alive,
            observer: None,
        }
    }

    /// Reports every connection's outcome to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Option<ConnectionObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn handshake(&self, stream: &mut ConnectionStream) -> Result<Option<Arc<dyn Codec>>, FrameError> {
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        let path = match read_frame(stream)? {
            Some(WireFrame::Data(Frame::Text(path))) => path,
            Some(_) => {
                write_frame(
                    stream,
                    &WireFrame::close(CloseStatus::PROTOCOL_ERROR, "expected an endpoint path"),
                )?;
                return Ok(None);
            }
            None => return Ok(None),
        };
        let Some(codec) = self.endpoints.resolve(&path) else {
            debug!(
                target: LISTENER_TARGET,
                path = path.as_str(),
                "rejected connection to unknown endpoint"
            );
            write_frame(
                stream,
                &WireFrame::close(CloseStatus::NOT_FOUND, format!("no endpoint at {path}")),
            )?;
            return Ok(None);
        };
        stream.set_read_timeout(None)?;
        write_frame(
            stream,
            &WireFrame::Data(Frame::Text(codec.media_type().to_owned())),
        )?;
        Ok(Some(codec))
    }

    fn run_session(
        &self,
        mut reader: ConnectionStream,
        connection: &ConnectionHandle,
        codec: &dyn Codec,
    ) -> CloseStatus {
        let writer = match reader.try_clone().and_then(FrameWriter::new) {
            Ok(writer) => Arc::new(writer),
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    connection = %connection.id(),
                    error = %error,
                    "failed to split connection stream"
                );
                return CloseStatus::ABNORMAL;
            }
        };
        if let Err(error) = self.dispatcher.create_session(connection) {
            warn!(
                target: LISTENER_TARGET,
                connection = %connection.id(),
                error = %error,
                "failed to create session"
            );
            writer.close(CloseStatus::INTERNAL_ERROR, "session unavailable");
            return CloseStatus::INTERNAL_ERROR;
        }
        let _session = SessionGuard::new(&self.dispatcher, connection);

        let clock = Arc::new(KeepAliveClock::new());
        let keep_alive = spawn_keep_alive(
            connection.id(),
            self.keep_alive,
            Arc::clone(&writer),
            Arc::clone(&clock),
        );
        let status = self.read_loop(&mut reader, connection, codec, &writer, &clock);
        clock.stop();
        if let Some(handle) = keep_alive
            && handle.join().is_err()
        {
            warn!(
                target: LISTENER_TARGET,
                connection = %connection.id(),
                "keep-alive thread panicked"
            );
        }
        status
    }

    fn read_loop(
        &self,
        reader: &mut ConnectionStream,
        connection: &ConnectionHandle,
        codec: &dyn Codec,
        writer: &FrameWriter,
        clock: &KeepAliveClock,
    ) -> CloseStatus {
        loop {
            let frame = match read_frame(reader) {
                Ok(Some(frame)) => frame,
                Ok(None) => return CloseStatus::ABNORMAL,
                Err(error) => {
                    let status = error.close_status();
                    debug!(
                        target: LISTENER_TARGET,
                        connection = %connection.id(),
                        error = %error,
                        "connection read failed"
                    );
                    if !matches!(error, FrameError::Io(_)) {
                        writer.close(status, error.to_string());
                    }
                    return status;
                }
            };
            clock.touch();

            match frame {
                WireFrame::Data(frame) => {
                    let mut channel = SocketChannel { writer, clock };
                    if let Err(error) =
                        self.dispatcher
                            .dispatch(connection, &frame, codec, &mut channel)
                    {
                        let status = error.close_status();
                        warn!(
                            target: LISTENER_TARGET,
                            connection = %connection.id(),
                            close_status = %status,
                            error = %error,
                            "closing connection after dispatch failure"
                        );
                        if !matches!(error, DispatchError::Send(_)) {
                            writer.close(status, error.to_string());
                        }
                        return status;
                    }
                }
                WireFrame::Ping(body) => {
                    if writer.send(&WireFrame::Pong(body)).is_ok() {
                        clock.touch();
                    }
                }
                WireFrame::Pong(_) => {}
                WireFrame::Close { status, reason } => {
                    debug!(
                        target: LISTENER_TARGET,
                        connection = %connection.id(),
                        close_status = %status,
                        reason = reason.as_str(),
                        "peer closed connection"
                    );
                    writer.close(CloseStatus::NORMAL, "");
                    return status;
                }
            }
        }
    }
}

impl<S: Send + Sync + 'static> ConnectionHandler for DispatchConnectionHandler<S> {
    fn handle(&self, mut stream: ConnectionStream, peer: String) {
        let codec = match self.handshake(&mut stream) {
            Ok(Some(codec)) => codec,
            Ok(None) => return,
            Err(error) => {
                debug!(
                    target: LISTENER_TARGET,
                    peer = peer.as_str(),
                    error = %error,
                    "handshake failed"
                );
                return;
            }
        };

        let connection = ConnectionHandle::new(peer, codec.name());
        let outcome = ConnectionOutcome::default();
        if let Some(observer) = &self.observer {
            observer(&connection, outcome.clone());
        }
        debug!(
            target: LISTENER_TARGET,
            connection = %connection.id(),
            peer = connection.peer(),
            codec = codec.name(),
            "connection established"
        );
        let status = self.run_session(stream, &connection, codec.as_ref());
        debug!(
            target: LISTENER_TARGET,
            connection = %connection.id(),
            close_status = %status,
            "connection closed"
        );
        outcome.record(status);
    }
}

/// Serialised write half of a connection.
struct FrameWriter {
    stream: Mutex<ConnectionStream>,
    control: ConnectionStream,
}

impl FrameWriter {
    fn new(stream: ConnectionStream) -> io::Result<Self> {
        let control = stream.try_clone()?;
        Ok(Self {
            stream: Mutex::new(stream),
            control,
        })
    }

    fn send(&self, frame: &WireFrame) -> io::Result<()> {
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| io::Error::other("connection writer lock poisoned"))?;
        write_frame(&mut *stream, frame)
    }

    fn close(&self, status: CloseStatus, reason: impl Into<String>) {
        if let Err(error) = self.send(&WireFrame::close(status, reason)) {
            trace!(
                target: LISTENER_TARGET,
                error = %error,
                "failed to send close frame"
            );
        }
    }

    fn shutdown(&self) {
        if let Err(error) = self.control.shutdown() {
            trace!(
                target: LISTENER_TARGET,
                error = %error,
                "failed to shut down connection"
            );
        }
    }
}

struct SocketChannel<'c> {
    writer: &'c FrameWriter,
    clock: &'c KeepAliveClock,
}

impl SocketChannel<'_> {
    fn send(&self, frame: &WireFrame) -> io::Result<()> {
        self.writer.send(frame)?;
        self.clock.touch();
        Ok(())
    }
}

impl ReturnChannel for SocketChannel<'_> {
    fn send_bytes(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        self.send(&WireFrame::Data(Frame::Binary(bytes)))
    }

    fn send_text(&mut self, text: String) -> io::Result<()> {
        self.send(&WireFrame::Data(Frame::Text(text)))
    }
}

struct ClockState {
    last_activity: Instant,
    stopped: bool,
}

/// Tracks the last traffic on a connection for the keep-alive thread.
struct KeepAliveClock {
    state: Mutex<ClockState>,
    wake: Condvar,
}

impl KeepAliveClock {
    fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                last_activity: Instant::now(),
                stopped: false,
            }),
            wake: Condvar::new(),
        }
    }

    fn touch(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.last_activity = Instant::now();
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.stopped = true;
        self.wake.notify_all();
    }

    /// Waits until a probe is due. Returns `false` once stopped.
    fn wait_for_probe(&self, interval: Duration) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if state.stopped {
                return false;
            }
            let due = state.last_activity + interval;
            let now = Instant::now();
            if now >= due {
                return true;
            }
            state = match self.wake.wait_timeout(state, due - now) {
                Ok((state, _)) => state,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

fn spawn_keep_alive(
    connection: ConnectionId,
    interval: Duration,
    writer: Arc<FrameWriter>,
    clock: Arc<KeepAliveClock>,
) -> Option<thread::JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name(format!("courier-keepalive-{}", connection.get()))
        .spawn(move || {
            while clock.wait_for_probe(interval) {
                if let Err(error) = writer.send(&WireFrame::Ping(Vec::new())) {
                    debug!(
                        target: LISTENER_TARGET,
                        connection = %connection,
                        error = %error,
                        "keep-alive probe failed"
                    );
                    writer.shutdown();
                    return;
                }
                clock.touch();
                trace!(
                    target: LISTENER_TARGET,
                    connection = %connection,
                    "sent keep-alive probe"
                );
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(error) => {
            warn!(
                target: LISTENER_TARGET,
                connection = %connection,
                error = %error,
                "failed to start keep-alive thread"
            );
            None
        }
    }
}
