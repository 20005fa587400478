use std::any::{Any, type_name};
use std::fmt;

use serde::de::DeserializeOwned;

use courier_wire::document::{Document, from_document};

use super::naming::short_type_name;

/// How an operation produces its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationKind {
    /// Exactly one result envelope per request.
    Unary,
    /// Zero or more envelopes emitted during the call.
    Streaming,
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Unary => "unary",
            Self::Streaming => "streaming",
        })
    }
}

pub(crate) type TypedDecoder = fn(&Document) -> Result<Box<dyn Any + Send>, String>;

/// How a parameter value is read from the payload.
#[derive(Clone, Copy)]
pub(crate) enum ParamDecoder {
    /// Raw bytes, accepted as a byte string or base64 text.
    Bytes,
    /// Any deserialisable type.
    Typed(TypedDecoder),
}

fn decode_typed<T>(value: &Document) -> Result<Box<dyn Any + Send>, String>
where
    T: DeserializeOwned + Send + 'static,
{
    from_document::<T>(value)
        .map(|decoded| Box::new(decoded) as Box<dyn Any + Send>)
        .map_err(|error| error.to_string())
}

/// A named, typed parameter read from the request payload.
#[derive(Clone)]
pub struct ParamSpec {
    name: String,
    type_name: String,
    nullable: bool,
    decoder: ParamDecoder,
}

impl ParamSpec {
    pub(crate) fn typed<T>(name: String, nullable: bool) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        Self {
            name,
            type_name: short_type_name(type_name::<T>()),
            nullable,
            decoder: ParamDecoder::Typed(decode_typed::<T>),
        }
    }

    pub(crate) fn bytes(name: String, nullable: bool) -> Self {
        Self {
            name,
            type_name: "bytes".to_owned(),
            nullable,
            decoder: ParamDecoder::Bytes,
        }
    }

    /// Payload key the value is read from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Short name of the declared type, as reported in errors.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether the parameter may be absent or null.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the parameter is a raw byte string.
    #[must_use]
    pub fn is_bytes(&self) -> bool {
        matches!(self.decoder, ParamDecoder::Bytes)
    }

    pub(crate) fn decoder(&self) -> ParamDecoder {
        self.decoder
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("nullable", &self.nullable)
            .field("bytes", &self.is_bytes())
            .finish()
    }
}

/// Everything the dispatcher knows about a registered operation.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub(crate) module: String,
    pub(crate) service: String,
    pub(crate) operation: String,
    pub(crate) message_type: String,
    pub(crate) namespace: String,
    pub(crate) params: Vec<ParamSpec>,
    pub(crate) kind: InvocationKind,
    pub(crate) value_type: String,
    pub(crate) result_message_type: Option<String>,
}

impl OperationDescriptor {
    /// Module segment of the message type.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Service segment of the message type.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Operation segment of the message type.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Full `module.service.operation` message type.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// `module.service` prefix used to resolve relative message types.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Declared parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|param| param.name == name)
    }

    /// Unary or streaming.
    #[must_use]
    pub fn kind(&self) -> InvocationKind {
        self.kind
    }

    /// Short name of the return type for unary operations, or of the item
    /// type for streaming ones.
    #[must_use]
    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    /// Message type of the unary result envelope. `None` for streaming
    /// operations, which name each emitted envelope themselves.
    #[must_use]
    pub fn result_message_type(&self) -> Option<&str> {
        self.result_message_type.as_deref()
    }
}
