use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Binary field usable inside structured payload types.
///
/// Serialises as a native byte string, which the JSON codec renders as
/// standard base64. Deserialises from bytes, from standard base64 text, or
/// from a list of octets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Binary(pub Vec<u8>);

impl Binary {
    /// Borrows the wrapped bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Binary {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(BinaryVisitor)
    }
}

struct BinaryVisitor;

impl<'de> Visitor<'de> for BinaryVisitor {
    type Value = Binary;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a byte string or standard base64 text")
    }

    fn visit_bytes<E: de::Error>(self, value: &[u8]) -> Result<Binary, E> {
        Ok(Binary(value.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, value: Vec<u8>) -> Result<Binary, E> {
        Ok(Binary(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Binary, E> {
        STANDARD
            .decode(value)
            .map(Binary)
            .map_err(|error| E::custom(format!("invalid base64: {error}")))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Binary, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(Binary(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, from_document, to_document};

    #[test]
    fn serialises_as_native_bytes() {
        let document = to_document(&Binary(vec![1, 2, 3])).expect("to document");
        assert_eq!(document, Document::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn accepts_standard_base64_text() {
        let binary: Binary =
            from_document(&Document::Text("AQID".to_owned())).expect("from text");
        assert_eq!(binary.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn rejects_url_safe_alphabet() {
        let result = from_document::<Binary>(&Document::Text("-_-_".to_owned()));
        assert!(result.is_err());
    }
}
