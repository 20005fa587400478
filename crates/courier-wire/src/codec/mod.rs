//! Pluggable wire encodings.
//!
//! A [`Codec`] turns documents into frames and back. Both built-in codecs
//! share the [`Document`] model, so an envelope decoded by either one is
//! structurally identical.

mod cbor;
mod json;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::document::Document;
use crate::envelope::{Envelope, EnvelopeError};
use crate::frame::{Frame, FrameKind};

pub use self::cbor::CborCodec;
pub use self::json::JsonCodec;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame's framing kind cannot be read by this codec.
    #[error("{codec} codec cannot read {kind} frames")]
    UnexpectedFrame { codec: &'static str, kind: FrameKind },
    /// The frame body was not a well-formed document.
    #[error("malformed {codec} document: {message}")]
    Malformed {
        codec: &'static str,
        message: String,
    },
    /// The document could not be written.
    #[error("failed to encode {codec} document: {message}")]
    Encode {
        codec: &'static str,
        message: String,
    },
    /// The document did not have the envelope shape.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl CodecError {
    pub(crate) fn malformed(codec: &'static str, message: impl fmt::Display) -> Self {
        Self::Malformed {
            codec,
            message: message.to_string(),
        }
    }

    pub(crate) fn encode(codec: &'static str, message: impl fmt::Display) -> Self {
        Self::Encode {
            codec,
            message: message.to_string(),
        }
    }
}

/// A wire encoding for envelopes and documents.
pub trait Codec: fmt::Debug + Send + Sync {
    /// Short name used as the endpoint suffix, for example `json`.
    fn name(&self) -> &'static str;

    /// Media type used for single-shot negotiation.
    fn media_type(&self) -> &'static str;

    /// Framing kind this codec writes.
    fn frame_kind(&self) -> FrameKind;

    /// Encodes a document into a frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] when the document cannot be written.
    fn encode_document(&self, document: &Document) -> Result<Frame, CodecError>;

    /// Decodes a document from a frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the frame kind is unsupported or its body
    /// is malformed.
    fn decode_document(&self, frame: &Frame) -> Result<Document, CodecError>;

    /// Encodes an envelope.
    ///
    /// # Errors
    ///
    /// Propagates [`Codec::encode_document`] failures.
    fn encode(&self, envelope: &Envelope) -> Result<Frame, CodecError> {
        self.encode_document(&envelope.to_document())
    }

    /// Decodes an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Envelope`] when the decoded document does not
    /// have the envelope shape.
    fn decode(&self, frame: &Frame) -> Result<Envelope, CodecError> {
        let document = self.decode_document(frame)?;
        Ok(Envelope::from_document(document)?)
    }
}

/// Ordered set of available codecs.
#[derive(Debug, Clone)]
pub struct CodecSet {
    codecs: Vec<Arc<dyn Codec>>,
}

impl CodecSet {
    /// Builds a set from the given codecs; order drives negotiation fallbacks.
    #[must_use]
    pub fn new(codecs: Vec<Arc<dyn Codec>>) -> Self {
        Self { codecs }
    }

    /// JSON first, then CBOR.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![Arc::new(JsonCodec), Arc::new(CborCodec)])
    }

    /// Finds a codec by its endpoint name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.codecs
            .iter()
            .find(|codec| codec.name() == name)
            .cloned()
    }

    /// Finds a codec by media type, ignoring case and parameters.
    #[must_use]
    pub fn by_media_type(&self, media_type: &str) -> Option<Arc<dyn Codec>> {
        let essence = media_type.split(';').next().unwrap_or(media_type).trim();
        self.codecs
            .iter()
            .find(|codec| codec.media_type().eq_ignore_ascii_case(essence))
            .cloned()
    }

    /// The preferred codec, if any.
    #[must_use]
    pub fn first(&self) -> Option<Arc<dyn Codec>> {
        self.codecs.first().cloned()
    }

    /// Iterates the codecs in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Codec>> {
        self.codecs.iter()
    }
}
