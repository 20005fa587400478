use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, error, trace, warn};

use courier_wire::document::{Document, from_document};
use courier_wire::{Codec, CorrelationId, Envelope, Frame, PROTOCOL_VERSION, Version};

use crate::registry::OperationRegistry;
use crate::session::{ConnectionHandle, SESSION_TARGET, SessionListener, SessionStore};

use super::binding;
use super::call::{Call, EmitSink};
use super::channel::ReturnChannel;
use super::errors::{ApiError, DispatchError, MarshalableError, OperationError, error_payload};
use super::DISPATCH_TARGET;

type SessionFactory<S> = Box<dyn Fn(&ConnectionHandle) -> S + Send + Sync>;
type MessageListener<S> = Box<dyn Fn(&ConnectionHandle, &S, Option<&Document>) + Send + Sync>;

/// Routes inbound frames to operations and owns per-connection sessions.
pub struct Dispatcher<S> {
    registry: OperationRegistry<S>,
    sessions: SessionStore<S>,
    session_factory: SessionFactory<S>,
    session_listeners: Vec<Arc<dyn SessionListener<S>>>,
    message_listeners: HashMap<String, MessageListener<S>>,
    release_version: Version,
}

impl<S: Send + Sync + 'static> Dispatcher<S> {
    /// Creates a dispatcher whose sessions are built by `session_factory`.
    pub fn new<F>(registry: OperationRegistry<S>, session_factory: F) -> Self
    where
        F: Fn(&ConnectionHandle) -> S + Send + Sync + 'static,
    {
        Self {
            registry,
            sessions: SessionStore::default(),
            session_factory: Box::new(session_factory),
            session_listeners: Vec::new(),
            message_listeners: HashMap::new(),
            release_version: PROTOCOL_VERSION,
        }
    }

    /// Sets the release version stamped on every response.
    #[must_use]
    pub fn with_release_version(mut self, release_version: Version) -> Self {
        self.release_version = release_version;
        self
    }

    /// Adds a session lifecycle observer.
    pub fn add_session_listener(&mut self, listener: Arc<dyn SessionListener<S>>) {
        self.session_listeners.push(listener);
    }

    /// Registers a control-channel listener for `message_type`.
    ///
    /// Matching messages skip the operation registry. The payload is
    /// deserialised into `T`; malformed payloads are logged and dropped.
    /// Listeners never produce responses.
    pub fn put_message_listener<T, F>(&mut self, message_type: impl Into<String>, listener: F)
    where
        T: DeserializeOwned,
        F: Fn(&ConnectionHandle, &S, T) + Send + Sync + 'static,
    {
        let message_type = message_type.into();
        let name = message_type.clone();
        let erased: MessageListener<S> = Box::new(
            move |connection: &ConnectionHandle, session: &S, payload: Option<&Document>| {
                let payload = payload.cloned().unwrap_or(Document::Null);
                match from_document::<T>(&payload) {
                    Ok(value) => listener(connection, session, value),
                    Err(error) => warn!(
                        target: DISPATCH_TARGET,
                        connection = %connection.id(),
                        message_type = name.as_str(),
                        error = %error,
                        "ignoring malformed control message"
                    ),
                }
            },
        );
        self.message_listeners.insert(message_type, erased);
    }

    /// Operation table.
    #[must_use]
    pub fn registry(&self) -> &OperationRegistry<S> {
        &self.registry
    }

    /// Live sessions.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore<S> {
        &self.sessions
    }

    /// Release version stamped on responses.
    #[must_use]
    pub fn release_version(&self) -> Version {
        self.release_version
    }

    /// Builds and stores the session for a new connection, then notifies
    /// listeners.
    ///
    /// # Errors
    ///
    /// Fails if the connection already has a session or the store is
    /// poisoned.
    pub fn create_session(&self, connection: &ConnectionHandle) -> Result<Arc<S>, DispatchError> {
        let session = Arc::new((self.session_factory)(connection));
        if !self.sessions.insert(connection.id(), Arc::clone(&session))? {
            return Err(DispatchError::internal(format!(
                "connection {} already has a session",
                connection.id()
            )));
        }
        debug!(
            target: SESSION_TARGET,
            connection = %connection.id(),
            peer = connection.peer(),
            codec = connection.codec(),
            "session created"
        );
        for listener in &self.session_listeners {
            listener.session_created(connection, &session);
        }
        Ok(session)
    }

    /// Removes the session of a closed connection and notifies listeners.
    ///
    /// Returns `false` when there was no session to drop.
    ///
    /// # Errors
    ///
    /// Fails if the store is poisoned.
    pub fn drop_session(&self, connection: &ConnectionHandle) -> Result<bool, DispatchError> {
        let Some(session) = self.sessions.remove(connection.id())? else {
            return Ok(false);
        };
        debug!(
            target: SESSION_TARGET,
            connection = %connection.id(),
            "session dropped"
        );
        for listener in &self.session_listeners {
            listener.session_dropped(connection, &session);
        }
        Ok(true)
    }

    /// Handles one inbound frame.
    ///
    /// Operation failures are answered on `channel` with an error envelope
    /// that carries the request's correlation id, and return `Ok`.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when the frame is not a usable envelope,
    /// the connection has no session, or the channel fails. The caller is
    /// expected to close the connection with [`DispatchError::close_status`].
    pub fn dispatch(
        &self,
        connection: &ConnectionHandle,
        frame: &Frame,
        codec: &dyn Codec,
        channel: &mut dyn ReturnChannel,
    ) -> Result<(), DispatchError> {
        let envelope = codec.decode(frame)?;
        if !envelope
            .protocol_version
            .is_compatible_with(&PROTOCOL_VERSION)
        {
            return Err(DispatchError::ProtocolVersion {
                received: envelope.protocol_version,
                supported: PROTOCOL_VERSION,
            });
        }
        let session = self
            .sessions
            .get(connection.id())?
            .ok_or(DispatchError::NoSession {
                connection: connection.id(),
            })?;

        trace!(
            target: DISPATCH_TARGET,
            connection = %connection.id(),
            correlation_id = %envelope.correlation_id,
            message_type = envelope.message_type.as_str(),
            "received envelope"
        );

        if let Some(listener) = self.message_listeners.get(&envelope.message_type) {
            listener(connection, &*session, envelope.payload.as_ref());
            return Ok(());
        }

        let mut responder = Responder {
            codec,
            channel,
            correlation_id: &envelope.correlation_id,
            release_version: self.release_version,
            failure: None,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.invoke(connection, &session, &envelope, &mut responder)
        }));
        let failure = match outcome {
            Ok(Ok(())) => return responder.finish(),
            Ok(Err(failure)) => failure,
            Err(payload) => OperationError::internal(format!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            )),
        };
        if let Some(broken) = responder.failure.take() {
            return Err(broken);
        }
        self.answer_failure(&envelope, failure, &mut responder)
    }

    fn invoke(
        &self,
        connection: &ConnectionHandle,
        session: &S,
        envelope: &Envelope,
        responder: &mut Responder<'_>,
    ) -> Result<(), OperationError> {
        let operation = self.registry.lookup(&envelope.message_type)?;
        let arguments = binding::bind(&operation.descriptor, envelope.payload.as_ref())?;
        let mut call = Call::new(&operation.descriptor, connection, session, arguments);
        let result = (operation.invoke)(&mut call, responder)?;
        match operation.descriptor.result_message_type() {
            Some(result_type) => responder.emit(result_type, result),
            None => Ok(()),
        }
    }

    fn answer_failure(
        &self,
        envelope: &Envelope,
        failure: OperationError,
        responder: &mut Responder<'_>,
    ) -> Result<(), DispatchError> {
        match failure {
            OperationError::Structured(structured) => {
                debug!(
                    target: DISPATCH_TARGET,
                    correlation_id = %envelope.correlation_id,
                    message_type = envelope.message_type.as_str(),
                    error_type = structured.protocol_message_type(),
                    "operation returned a structured error"
                );
                responder.send(
                    structured.protocol_message_type(),
                    Some(error_payload(structured.as_ref())),
                )
            }
            OperationError::Internal(internal) => {
                error!(
                    target: DISPATCH_TARGET,
                    correlation_id = %envelope.correlation_id,
                    message_type = envelope.message_type.as_str(),
                    error = ?internal,
                    "operation failed"
                );
                let api = ApiError::InternalServerError;
                responder.send(api.protocol_message_type(), Some(error_payload(&api)))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Encodes and sends response envelopes for one request.
struct Responder<'r> {
    codec: &'r dyn Codec,
    channel: &'r mut dyn ReturnChannel,
    correlation_id: &'r CorrelationId,
    release_version: Version,
    failure: Option<DispatchError>,
}

impl Responder<'_> {
    fn send(&mut self, message_type: &str, payload: Option<Document>) -> Result<(), DispatchError> {
        let envelope = Envelope::new(
            self.release_version,
            self.correlation_id.clone(),
            message_type,
            payload,
        );
        let frame = self.codec.encode(&envelope).map_err(DispatchError::Encode)?;
        trace!(
            target: DISPATCH_TARGET,
            correlation_id = %self.correlation_id,
            message_type,
            bytes = frame.len(),
            "sending envelope"
        );
        self.channel.send_frame(frame).map_err(DispatchError::Send)
    }

    fn finish(mut self) -> Result<(), DispatchError> {
        self.failure.take().map_or(Ok(()), Err)
    }
}

impl EmitSink for Responder<'_> {
    fn emit(&mut self, message_type: &str, payload: Option<Document>) -> Result<(), OperationError> {
        if self.failure.is_some() {
            return Err(OperationError::internal("response channel is unusable"));
        }
        self.send(message_type, payload).map_err(|failure| {
            let error = OperationError::internal(failure.to_string());
            self.failure = Some(failure);
            error
        })
    }
}

/// Drops the session of a connection when it goes out of scope.
pub(crate) struct SessionGuard<'d, S: Send + Sync + 'static> {
    dispatcher: &'d Dispatcher<S>,
    connection: &'d ConnectionHandle,
}

impl<'d, S: Send + Sync + 'static> SessionGuard<'d, S> {
    pub(crate) fn new(dispatcher: &'d Dispatcher<S>, connection: &'d ConnectionHandle) -> Self {
        Self {
            dispatcher,
            connection,
        }
    }
}

impl<S: Send + Sync + 'static> Drop for SessionGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(error) = self.dispatcher.drop_session(self.connection) {
            warn!(
                target: SESSION_TARGET,
                connection = %self.connection.id(),
                error = %error,
                "failed to drop session"
            );
        }
    }
}
