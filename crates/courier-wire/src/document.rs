//! Structured payload model.
//!
//! Payloads are CBOR data model values: nested maps, lists, scalars and binary
//! strings. The JSON codec maps onto the same model, so handlers serialise to
//! and from [`Document`] without caring about the codec in use.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A structured payload document.
pub type Document = ciborium::Value;

/// Errors raised while converting between typed values and documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The value could not be represented as a document.
    #[error("failed to build document: {0}")]
    Serialize(String),
    /// The document did not match the requested type.
    #[error("{0}")]
    Deserialize(String),
}

/// Serialises a typed value into a document.
///
/// # Errors
///
/// Returns [`DocumentError::Serialize`] when the value's `Serialize`
/// implementation fails.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document, DocumentError> {
    Document::serialized(value).map_err(|error| DocumentError::Serialize(error.to_string()))
}

/// Deserialises a typed value from a document.
///
/// # Errors
///
/// Returns [`DocumentError::Deserialize`] when the document's shape does not
/// match `T`.
pub fn from_document<T: DeserializeOwned>(document: &Document) -> Result<T, DocumentError> {
    document
        .deserialized()
        .map_err(|error| DocumentError::Deserialize(error.to_string()))
}

/// Looks up a text-keyed entry in a map document.
///
/// Returns `None` for missing keys and for documents that are not maps.
#[must_use]
pub fn field<'a>(document: &'a Document, name: &str) -> Option<&'a Document> {
    let Document::Map(entries) = document else {
        return None;
    };
    entries
        .iter()
        .find(|(key, _)| matches!(key, Document::Text(text) if text == name))
        .map(|(_, value)| value)
}

/// Builds a map document from text keys.
pub fn map<K, I>(entries: I) -> Document
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Document)>,
{
    Document::Map(
        entries
            .into_iter()
            .map(|(key, value)| (Document::Text(key.into()), value))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        name: String,
        badge: u32,
    }

    #[test]
    fn typed_values_survive_document_conversion() {
        let holder = Holder {
            name: "Ada".to_owned(),
            badge: 7,
        };
        let document = to_document(&holder).expect("to document");
        assert_eq!(
            field(&document, "name"),
            Some(&Document::Text("Ada".to_owned()))
        );
        let back: Holder = from_document(&document).expect("from document");
        assert_eq!(back, holder);
    }

    #[test]
    fn field_ignores_non_map_documents() {
        assert!(field(&Document::Text("x".to_owned()), "x").is_none());
        assert!(field(&Document::Null, "x").is_none());
    }

    #[test]
    fn mismatched_shapes_report_deserialize_errors() {
        let document = map([("name", Document::Bool(true))]);
        let error = from_document::<Holder>(&document).expect_err("should fail");
        assert!(matches!(error, DocumentError::Deserialize(_)));
    }
}
