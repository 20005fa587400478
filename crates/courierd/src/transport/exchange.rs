//! Single request/response exchanges over the dispatch engine.
//!
//! Used by request-per-call transports: the codec is negotiated from media
//! type headers, a transient session lives for exactly one dispatch, and the
//! response frames are collected in memory.

use std::sync::Arc;

use thiserror::Error;

use courier_wire::{Codec, CodecSet, Frame};

use crate::dispatch::{CollectingChannel, DispatchError, Dispatcher, SessionGuard};
use crate::session::ConnectionHandle;

/// Codec negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// The request body's media type has no codec.
    #[error("unsupported media type '{content_type}'")]
    UnsupportedMediaType { content_type: String },
    /// None of the acceptable response media types has a codec.
    #[error("none of '{accept}' can be produced")]
    NotAcceptable { accept: String },
}

impl NegotiationError {
    /// Matching HTTP status code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedMediaType { .. } => 415,
            Self::NotAcceptable { .. } => 406,
        }
    }
}

/// Runs single requests through a shared [`Dispatcher`].
pub struct Exchange<S> {
    dispatcher: Arc<Dispatcher<S>>,
    codecs: CodecSet,
}

impl<S: Send + Sync + 'static> Exchange<S> {
    /// Creates an exchange offering `codecs`.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher<S>>, codecs: CodecSet) -> Self {
        Self { dispatcher, codecs }
    }

    /// Picks the codec for a request.
    ///
    /// A content type must name a codec. Without one, the `Accept` entries
    /// are tried in order; `*/*` or no header selects the preferred codec.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError`] when no codec fits.
    pub fn negotiate(
        &self,
        content_type: Option<&str>,
        accept: Option<&str>,
    ) -> Result<Arc<dyn Codec>, NegotiationError> {
        if let Some(content_type) = content_type.filter(|value| !value.trim().is_empty()) {
            return self
                .codecs
                .by_media_type(content_type)
                .ok_or_else(|| NegotiationError::UnsupportedMediaType {
                    content_type: content_type.to_owned(),
                });
        }

        let not_acceptable = || NegotiationError::NotAcceptable {
            accept: accept.unwrap_or_default().to_owned(),
        };
        let Some(accept) = accept.filter(|value| !value.trim().is_empty()) else {
            return self.codecs.first().ok_or_else(not_acceptable);
        };
        accept
            .split(',')
            .map(|entry| entry.split(';').next().unwrap_or(entry).trim())
            .find_map(|media_type| match media_type {
                "*/*" => self.codecs.first(),
                other => self.codecs.by_media_type(other),
            })
            .ok_or_else(not_acceptable)
    }

    /// Dispatches one request frame on a transient session and returns the
    /// response frames.
    ///
    /// # Errors
    ///
    /// Propagates [`DispatchError`]s such as undecodable request bodies.
    pub fn run(&self, codec: &dyn Codec, peer: &str, request: &Frame) -> Result<Vec<Frame>, DispatchError> {
        let connection = ConnectionHandle::new(peer, codec.name());
        self.dispatcher.create_session(&connection)?;
        let _session = SessionGuard::new(&self.dispatcher, &connection);
        let mut channel = CollectingChannel::default();
        self.dispatcher
            .dispatch(&connection, request, codec, &mut channel)?;
        Ok(channel.into_frames())
    }
}
