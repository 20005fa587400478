//! Error types for operation invocation and message dispatch.
//!
//! Two families live here. Operation errors ([`OperationError`]) are raised
//! while resolving, binding or running an operation; the engine answers them
//! with an error envelope carrying the request's correlation id. Dispatch
//! errors ([`DispatchError`]) happen before a correlation id can be trusted or
//! when the connection itself fails, and end the connection with a close
//! status.

use std::fmt;
use std::io;

use thiserror::Error;

use courier_wire::document::{self, Document};
use courier_wire::{CloseStatus, CodecError, Version};

use crate::session::ConnectionId;

/// A domain error that is safe to send to clients.
///
/// Implementors choose a stable protocol message type; the human message
/// defaults to the `Display` output.
pub trait MarshalableError: std::error::Error + Send + Sync + 'static {
    /// Message type of the error envelope, for example
    /// `core.error.missing-parameter`.
    fn protocol_message_type(&self) -> &str;

    /// Human-readable message placed in the payload's `message` field.
    fn message(&self) -> String {
        self.to_string()
    }

    /// Extra payload fields besides `message`.
    fn details(&self) -> Vec<(String, Document)> {
        Vec::new()
    }
}

/// Builds the error envelope payload: `message` followed by any details.
pub(crate) fn error_payload(error: &dyn MarshalableError) -> Document {
    let mut entries = vec![("message".to_owned(), Document::Text(error.message()))];
    entries.extend(
        error
            .details()
            .into_iter()
            .filter(|(key, _)| key != "message"),
    );
    document::map(entries)
}

/// Errors raised by the dispatch engine itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No operation or listener is registered for the message type.
    #[error("unknown message type '{message_type}'")]
    UnknownMessageType { message_type: String },
    /// A non-nullable parameter was absent or null.
    #[error("missing parameter '{name}' of type {type_name}")]
    MissingParameter { name: String, type_name: String },
    /// A parameter value did not match its declared type.
    #[error("invalid format for parameter '{name}': {detail}")]
    InvalidParameterFormat { name: String, detail: String },
    /// Catch-all for failures whose detail stays server-side.
    #[error("internal server error")]
    InternalServerError,
}

impl ApiError {
    /// Creates an unknown message type error.
    pub fn unknown_message_type(message_type: impl Into<String>) -> Self {
        Self::UnknownMessageType {
            message_type: message_type.into(),
        }
    }

    /// Creates a missing parameter error.
    pub fn missing_parameter(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::MissingParameter {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates an invalid parameter format error.
    pub fn invalid_parameter_format(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidParameterFormat {
            name: name.into(),
            detail: detail.into(),
        }
    }
}

impl MarshalableError for ApiError {
    fn protocol_message_type(&self) -> &str {
        match self {
            Self::UnknownMessageType { .. } => "core.error.unknown-message-type",
            Self::MissingParameter { .. } => "core.error.missing-parameter",
            Self::InvalidParameterFormat { .. } => "core.error.invalid-parameter-format",
            Self::InternalServerError => "core.error.internal-server-error",
        }
    }

    fn details(&self) -> Vec<(String, Document)> {
        let text = |key: &str, value: &str| (key.to_owned(), Document::Text(value.to_owned()));
        match self {
            Self::UnknownMessageType { message_type } => {
                vec![text("messageType", message_type)]
            }
            Self::MissingParameter { name, type_name } => {
                vec![text("parameter", name), text("type", type_name)]
            }
            Self::InvalidParameterFormat { name, detail } => {
                vec![text("parameter", name), text("detail", detail)]
            }
            Self::InternalServerError => Vec::new(),
        }
    }
}

/// Failure of a single operation call.
///
/// `?` converts both marshalable errors and [`anyhow::Error`] into this type,
/// so handlers can mix domain errors with internal failures freely.
pub enum OperationError {
    /// Sent to the client as its own error envelope.
    Structured(Box<dyn MarshalableError>),
    /// Logged in full and answered with `InternalServerError`.
    Internal(anyhow::Error),
}

impl OperationError {
    /// Creates an internal failure from a message.
    pub fn internal(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Internal(anyhow::Error::msg(message))
    }
}

impl<E: MarshalableError> From<E> for OperationError {
    fn from(error: E) -> Self {
        Self::Structured(Box::new(error))
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error)
    }
}

impl fmt::Debug for OperationError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(error) => formatter
                .debug_tuple("Structured")
                .field(&error.protocol_message_type())
                .field(&error.message())
                .finish(),
            Self::Internal(error) => formatter.debug_tuple("Internal").field(error).finish(),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(error) => write!(
                formatter,
                "{}: {}",
                error.protocol_message_type(),
                error.message()
            ),
            Self::Internal(error) => write!(formatter, "internal failure: {error:#}"),
        }
    }
}

/// Connection-level dispatch failures.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The frame could not be decoded into an envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[from] CodecError),
    /// The envelope's protocol major version is not supported.
    #[error("unsupported protocol version {received}; this server speaks {supported}")]
    ProtocolVersion {
        received: Version,
        supported: Version,
    },
    /// A message arrived for a connection without a stored session.
    #[error("no session for connection {connection}")]
    NoSession { connection: ConnectionId },
    /// A response frame could not be written.
    #[error("failed to send response: {0}")]
    Send(#[source] io::Error),
    /// A response envelope could not be encoded.
    #[error("failed to encode response: {0}")]
    Encode(#[source] CodecError),
    /// Internal error (e.g., lock poisoned).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Close status used when this error ends a connection.
    #[must_use]
    pub fn close_status(&self) -> CloseStatus {
        match self {
            Self::Decode(CodecError::UnexpectedFrame { .. }) => CloseStatus::BAD_DATA,
            Self::Decode(_) => CloseStatus::BAD_PAYLOAD,
            Self::ProtocolVersion { .. } => CloseStatus::PROTOCOL_ERROR,
            Self::NoSession { .. } => CloseStatus::POLICY_VIOLATION,
            Self::Send(_) => CloseStatus::ABNORMAL,
            Self::Encode(_) | Self::Internal { .. } => CloseStatus::INTERNAL_ERROR,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
