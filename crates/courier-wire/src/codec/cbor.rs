//! Binary CBOR codec.

use super::{Codec, CodecError};
use crate::document::Document;
use crate::frame::{Frame, FrameKind};

const NAME: &str = "cbor";

/// CBOR binary codec. Byte strings travel natively.
#[derive(Debug, Default, Clone, Copy)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn media_type(&self) -> &'static str {
        "application/cbor"
    }

    fn frame_kind(&self) -> FrameKind {
        FrameKind::Binary
    }

    fn encode_document(&self, document: &Document) -> Result<Frame, CodecError> {
        let mut buffer = Vec::new();
        ciborium::into_writer(document, &mut buffer)
            .map_err(|error| CodecError::encode(NAME, error))?;
        Ok(Frame::Binary(buffer))
    }

    fn decode_document(&self, frame: &Frame) -> Result<Document, CodecError> {
        let Frame::Binary(bytes) = frame else {
            return Err(CodecError::UnexpectedFrame {
                codec: NAME,
                kind: frame.kind(),
            });
        };
        ciborium::from_reader(bytes.as_slice()).map_err(|error| CodecError::malformed(NAME, error))
    }
}
