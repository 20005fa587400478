use std::any::{Any, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;

use anyhow::Context as _;
use serde::Serialize;

use courier_wire::document::{Document, to_document};

use crate::registry::OperationDescriptor;
use crate::session::ConnectionHandle;

use super::errors::{ApiError, OperationError};

/// Parameter values decoded from one request payload.
#[derive(Default)]
pub(crate) struct BoundArguments {
    values: HashMap<String, Option<Box<dyn Any + Send>>>,
}

impl BoundArguments {
    pub(crate) fn insert(&mut self, name: &str, value: Option<Box<dyn Any + Send>>) {
        self.values.insert(name.to_owned(), value);
    }

    fn take(&mut self, name: &str) -> Option<Option<Box<dyn Any + Send>>> {
        self.values.remove(name)
    }
}

/// Context of a single operation call.
///
/// Gives handlers their bound parameters and the two ambient values, the
/// connection handle and the connection's session.
pub struct Call<'a, S> {
    descriptor: &'a OperationDescriptor,
    connection: &'a ConnectionHandle,
    session: &'a S,
    arguments: BoundArguments,
}

impl<'a, S> Call<'a, S> {
    pub(crate) fn new(
        descriptor: &'a OperationDescriptor,
        connection: &'a ConnectionHandle,
        session: &'a S,
        arguments: BoundArguments,
    ) -> Self {
        Self {
            descriptor,
            connection,
            session,
            arguments,
        }
    }

    /// Takes a required parameter.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` if the value was already taken or the
    /// parameter is nullable and absent, and an internal error if `T` does
    /// not match the declared type.
    pub fn arg<T: Any>(&mut self, name: &str) -> Result<T, OperationError> {
        match self.optional_arg(name)? {
            Some(value) => Ok(value),
            None => {
                let type_name = self
                    .descriptor
                    .param(name)
                    .map_or("unknown", |param| param.type_name());
                Err(ApiError::missing_parameter(name, type_name).into())
            }
        }
    }

    /// Takes a parameter that may be absent.
    ///
    /// # Errors
    ///
    /// Returns an internal error if `name` is not declared on the operation or
    /// `T` does not match the declared type.
    pub fn optional_arg<T: Any>(&mut self, name: &str) -> Result<Option<T>, OperationError> {
        if self.descriptor.param(name).is_none() {
            return Err(OperationError::internal(format!(
                "{} declares no parameter '{name}'",
                self.descriptor.message_type()
            )));
        }
        let Some(Some(value)) = self.arguments.take(name) else {
            return Ok(None);
        };
        value.downcast::<T>().map(|value| Some(*value)).map_err(|_| {
            OperationError::internal(format!(
                "parameter '{name}' of {} is not a {}",
                self.descriptor.message_type(),
                type_name::<T>()
            ))
        })
    }

    /// Session data of the calling connection.
    #[must_use]
    pub fn session(&self) -> &'a S {
        self.session
    }

    /// Handle of the calling connection.
    #[must_use]
    pub fn connection(&self) -> &'a ConnectionHandle {
        self.connection
    }

    /// Descriptor of the operation being called.
    #[must_use]
    pub fn descriptor(&self) -> &'a OperationDescriptor {
        self.descriptor
    }

    /// Message type of the request.
    #[must_use]
    pub fn message_type(&self) -> &'a str {
        self.descriptor.message_type()
    }
}

/// Destination for envelopes produced during a call.
pub trait EmitSink {
    /// Sends one envelope with the request's correlation id.
    ///
    /// # Errors
    ///
    /// Fails when the response channel is closed or encoding fails.
    fn emit(&mut self, message_type: &str, payload: Option<Document>) -> Result<(), OperationError>;
}

/// Typed emitter handed to streaming operations.
///
/// Each emitted item is sent immediately as its own envelope.
pub struct Emitter<'e, T> {
    sink: &'e mut dyn EmitSink,
    namespace: String,
    emitted: usize,
    item: PhantomData<fn(&T)>,
}

impl<'e, T: Serialize> Emitter<'e, T> {
    pub(crate) fn new(sink: &'e mut dyn EmitSink, namespace: &str) -> Self {
        Self {
            sink,
            namespace: namespace.to_owned(),
            emitted: 0,
            item: PhantomData,
        }
    }

    /// Sends `item` under `message_type`. A leading `.` makes the message
    /// type relative to the operation's `module.service`.
    ///
    /// # Errors
    ///
    /// Fails when the item cannot be serialised or the channel is closed;
    /// returning the error with `?` ends the stream.
    pub fn emit(&mut self, message_type: &str, item: &T) -> Result<(), OperationError> {
        let payload = to_document(item).context("failed to serialise emitted item")?;
        let message_type = match message_type.strip_prefix('.') {
            Some(local) => format!("{}.{local}", self.namespace),
            None => message_type.to_owned(),
        };
        self.sink.emit(&message_type, Some(payload))?;
        self.emitted += 1;
        Ok(())
    }

    /// Number of items sent so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}
