//! The versioned message envelope.
//!
//! The envelope has the same logical shape under every codec:
//!
//! | key               | value                            |
//! |-------------------|----------------------------------|
//! | `protocolVersion` | `"major.minor.revision"`         |
//! | `releaseVersion`  | `"major.minor.revision"`         |
//! | `correlationId`   | byte string (base64 under JSON)  |
//! | `messageType`     | text                             |
//! | `payload`         | any document, or null            |

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

use crate::correlation::CorrelationId;
use crate::document::{self, Document};
use crate::version::{PROTOCOL_VERSION, Version};

const PROTOCOL_VERSION_KEY: &str = "protocolVersion";
const RELEASE_VERSION_KEY: &str = "releaseVersion";
const CORRELATION_ID_KEY: &str = "correlationId";
const MESSAGE_TYPE_KEY: &str = "messageType";
const PAYLOAD_KEY: &str = "payload";

/// Errors raised when a document does not have the envelope shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The outer document was not a map.
    #[error("envelope must be a map")]
    NotAMap,
    /// A required key was absent.
    #[error("envelope is missing '{0}'")]
    MissingField(&'static str),
    /// A key was present with an unusable value.
    #[error("envelope field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl EnvelopeError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// A versioned wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Protocol version the sender speaks.
    pub protocol_version: Version,
    /// Release version reported by the sender.
    pub release_version: Version,
    /// Caller-chosen token echoed on every response.
    pub correlation_id: CorrelationId,
    /// Dotted `module.service.operation` message type.
    pub message_type: String,
    /// Structured payload, absent when the message carries none.
    pub payload: Option<Document>,
}

impl Envelope {
    /// Builds an envelope stamped with the current protocol version.
    pub fn new(
        release_version: Version,
        correlation_id: CorrelationId,
        message_type: impl Into<String>,
        payload: Option<Document>,
    ) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            release_version,
            correlation_id,
            message_type: message_type.into(),
            payload,
        }
    }

    /// Converts the envelope into its document form.
    #[must_use]
    pub fn to_document(&self) -> Document {
        document::map([
            (
                PROTOCOL_VERSION_KEY,
                Document::Text(self.protocol_version.to_string()),
            ),
            (
                RELEASE_VERSION_KEY,
                Document::Text(self.release_version.to_string()),
            ),
            (
                CORRELATION_ID_KEY,
                Document::Bytes(self.correlation_id.as_bytes().to_vec()),
            ),
            (MESSAGE_TYPE_KEY, Document::Text(self.message_type.clone())),
            (PAYLOAD_KEY, self.payload.clone().unwrap_or(Document::Null)),
        ])
    }

    /// Recovers an envelope from its document form.
    ///
    /// A null or absent `payload` becomes `None`. The correlation id may be a
    /// byte string or standard base64 text, which is how textual codecs carry
    /// it.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvelopeError`] when the outer shape cannot be recovered.
    pub fn from_document(document: Document) -> Result<Self, EnvelopeError> {
        let Document::Map(entries) = document else {
            return Err(EnvelopeError::NotAMap);
        };

        let mut protocol_version = None;
        let mut release_version = None;
        let mut correlation_id = None;
        let mut message_type = None;
        let mut payload = None;
        for (key, value) in entries {
            let Document::Text(key) = key else {
                continue;
            };
            match key.as_str() {
                PROTOCOL_VERSION_KEY => {
                    protocol_version = Some(read_version(PROTOCOL_VERSION_KEY, &value)?);
                }
                RELEASE_VERSION_KEY => {
                    release_version = Some(read_version(RELEASE_VERSION_KEY, &value)?);
                }
                CORRELATION_ID_KEY => correlation_id = Some(read_correlation_id(value)?),
                MESSAGE_TYPE_KEY => match value {
                    Document::Text(text) => message_type = Some(text),
                    _ => return Err(EnvelopeError::invalid(MESSAGE_TYPE_KEY, "expected text")),
                },
                PAYLOAD_KEY => {
                    payload = match value {
                        Document::Null => None,
                        other => Some(other),
                    };
                }
                _ => {}
            }
        }

        Ok(Self {
            protocol_version: protocol_version
                .ok_or(EnvelopeError::MissingField(PROTOCOL_VERSION_KEY))?,
            release_version: release_version
                .ok_or(EnvelopeError::MissingField(RELEASE_VERSION_KEY))?,
            correlation_id: correlation_id
                .ok_or(EnvelopeError::MissingField(CORRELATION_ID_KEY))?,
            message_type: message_type.ok_or(EnvelopeError::MissingField(MESSAGE_TYPE_KEY))?,
            payload,
        })
    }
}

fn read_version(field: &'static str, value: &Document) -> Result<Version, EnvelopeError> {
    match value {
        Document::Text(text) => text
            .parse()
            .map_err(|error: crate::VersionParseError| EnvelopeError::invalid(field, error.to_string())),
        _ => Err(EnvelopeError::invalid(field, "expected a version string")),
    }
}

fn read_correlation_id(value: Document) -> Result<CorrelationId, EnvelopeError> {
    match value {
        Document::Bytes(bytes) => Ok(CorrelationId::new(bytes)),
        Document::Text(text) => STANDARD
            .decode(text.as_bytes())
            .map(CorrelationId::new)
            .map_err(|error| EnvelopeError::invalid(CORRELATION_ID_KEY, error.to_string())),
        _ => Err(EnvelopeError::invalid(
            CORRELATION_ID_KEY,
            "expected a byte string",
        )),
    }
}
