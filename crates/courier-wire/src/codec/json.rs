//! Textual JSON codec.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, Value};

use super::{Codec, CodecError};
use crate::document::Document;
use crate::frame::{Frame, FrameKind};

const NAME: &str = "json";

/// JSON text codec. Byte strings travel as standard base64 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn media_type(&self) -> &'static str {
        "application/json"
    }

    fn frame_kind(&self) -> FrameKind {
        FrameKind::Text
    }

    fn encode_document(&self, document: &Document) -> Result<Frame, CodecError> {
        serde_json::to_string(&to_json(document))
            .map(Frame::Text)
            .map_err(|error| CodecError::encode(NAME, error))
    }

    fn decode_document(&self, frame: &Frame) -> Result<Document, CodecError> {
        // Binary frames are read as UTF-8 text.
        let text = match frame {
            Frame::Text(text) => text.as_str(),
            Frame::Binary(bytes) => {
                std::str::from_utf8(bytes).map_err(|error| CodecError::malformed(NAME, error))?
            }
        };
        let value: Value =
            serde_json::from_str(text).map_err(|error| CodecError::malformed(NAME, error))?;
        Ok(from_json(value))
    }
}

fn to_json(document: &Document) -> Value {
    match document {
        Document::Null => Value::Null,
        Document::Bool(flag) => Value::Bool(*flag),
        Document::Integer(integer) => integer_to_json(i128::from(*integer)),
        Document::Float(float) => Number::from_f64(*float).map_or(Value::Null, Value::Number),
        Document::Text(text) => Value::String(text.clone()),
        Document::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
        Document::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        Document::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key_to_string(key), to_json(value)))
                .collect::<Map<String, Value>>(),
        ),
        Document::Tag(_, inner) => to_json(inner),
        _ => Value::Null,
    }
}

fn integer_to_json(integer: i128) -> Value {
    if let Ok(signed) = i64::try_from(integer) {
        Value::from(signed)
    } else if let Ok(unsigned) = u64::try_from(integer) {
        Value::from(unsigned)
    } else {
        Value::String(integer.to_string())
    }
}

fn key_to_string(key: &Document) -> String {
    match key {
        Document::Text(text) => text.clone(),
        other => to_json(other).to_string(),
    }
}

fn from_json(value: Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(flag) => Document::Bool(flag),
        Value::Number(number) => number_to_document(&number),
        Value::String(text) => Document::Text(text),
        Value::Array(items) => Document::Array(items.into_iter().map(from_json).collect()),
        Value::Object(entries) => Document::Map(
            entries
                .into_iter()
                .map(|(key, value)| (Document::Text(key), from_json(value)))
                .collect(),
        ),
    }
}

fn number_to_document(number: &Number) -> Document {
    if let Some(signed) = number.as_i64() {
        Document::Integer(signed.into())
    } else if let Some(unsigned) = number.as_u64() {
        Document::Integer(unsigned.into())
    } else {
        number
            .as_f64()
            .map_or(Document::Null, Document::Float)
    }
}
